// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The protocol encoder/decoder (component B): builds request bodies and parses response
//! bodies. Distinct wire shapes per protocol version are not needed at this layer; v3/v4/v5
//! share the same body encodings and differ only in envelope/outer framing (component A).

pub mod primitives;
pub mod request;
pub mod response;

pub use request::{encode_request, BatchStatement, EncodedValues, QueryParams, RequestBody};
pub use response::{decode_response, ErrorCodes, EventBody, Response, ResultBody, RowsMetadata};
