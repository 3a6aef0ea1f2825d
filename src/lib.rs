// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Core native-protocol driver for a wide-column distributed database speaking CQL.
//!
//! This crate owns the wire: framing (v3/v4 envelopes and v5 segmented/CRC-protected frames),
//! request/response encoding, stream-id multiplexing, the per-node connection lifecycle, and
//! the control-connection topology supervisor. Everything above the wire -- CQL value
//! (de)serialization, authentication mechanics, prepared-statement caching, page iteration,
//! retry policy, load balancing, and user-facing query ergonomics -- is left to an embedding
//! driver built on top of this crate.

pub mod compression;
pub mod connection;
pub mod control;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod stream;
pub mod transport;

pub use error::{ConnectionError, Error, ProtocolError};
