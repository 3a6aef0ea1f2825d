// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Builders for request bodies: STARTUP, OPTIONS, QUERY, PREPARE, EXECUTE, BATCH, REGISTER,
//! AUTH_RESPONSE. Column-value encoding is an external collaborator (§1 scope); callers supply
//! an already-encoded values blob (`[short] count` followed by `count * [bytes]`).

use super::primitives::*;
use std::collections::HashMap;

/// Query flags (masks), native protocol v4/v5.
pub mod query_flags {
    pub const VALUES: u8 = 0x01;
    pub const SKIP_METADATA: u8 = 0x02;
    pub const PAGE_SIZE: u8 = 0x04;
    pub const PAGING_STATE: u8 = 0x08;
    pub const SERIAL_CONSISTENCY: u8 = 0x10;
    pub const DEFAULT_TIMESTAMP: u8 = 0x20;
    pub const NAMES_FOR_VALUES: u8 = 0x40;
}

/// An already wire-encoded `[short] count` + `count * [bytes]` values blob. Produced by the
/// external CQL value-type encoder; this crate treats it as opaque.
#[derive(Clone, Debug, Default)]
pub struct EncodedValues(pub Vec<u8>);

/// Per-query parameters shared by QUERY, EXECUTE, and each statement of a BATCH.
#[derive(Clone, Debug, Default)]
pub struct QueryParams {
    pub consistency: u16,
    pub values: Option<EncodedValues>,
    pub skip_metadata: bool,
    pub page_size: Option<i32>,
    pub paging_state: Option<Vec<u8>>,
    pub serial_consistency: Option<u16>,
    pub timestamp: Option<i64>,
    pub names_for_values: bool,
}

impl QueryParams {
    fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.values.is_some() {
            flags |= query_flags::VALUES;
        }
        if self.skip_metadata {
            flags |= query_flags::SKIP_METADATA;
        }
        if self.page_size.is_some() {
            flags |= query_flags::PAGE_SIZE;
        }
        if self.paging_state.is_some() {
            flags |= query_flags::PAGING_STATE;
        }
        if self.serial_consistency.is_some() {
            flags |= query_flags::SERIAL_CONSISTENCY;
        }
        if self.timestamp.is_some() {
            flags |= query_flags::DEFAULT_TIMESTAMP;
        }
        if self.names_for_values {
            flags |= query_flags::NAMES_FOR_VALUES;
        }
        flags
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_short(out, self.consistency);
        out.push(self.flags());
        if let Some(values) = &self.values {
            out.extend_from_slice(&values.0);
        }
        if let Some(page_size) = self.page_size {
            write_int(out, page_size);
        }
        if let Some(paging_state) = &self.paging_state {
            write_bytes(out, Some(paging_state));
        }
        if let Some(serial_consistency) = self.serial_consistency {
            write_short(out, serial_consistency);
        }
        if let Some(timestamp) = self.timestamp {
            write_long(out, timestamp);
        }
    }
}

/// One statement of a BATCH: either a plain CQL string or a prepared statement id.
#[derive(Clone, Debug)]
pub enum BatchStatement {
    Query(String),
    Prepared(Vec<u8>),
}

/// Request bodies this core can build. Everything beyond the message envelope (result
/// paging iteration, retries, the prepared-statement cache) lives with the caller.
#[derive(Clone, Debug)]
pub enum RequestBody {
    /// First message on any connection: negotiates CQL/compression.
    Startup {
        cql_version: String,
        compression: Option<String>,
    },
    /// Asks the server for SUPPORTED options.
    Options,
    /// A plain CQL statement.
    Query { statement: String, params: QueryParams },
    /// Asks the server to prepare a statement, returning an id to EXECUTE later.
    Prepare { statement: String },
    /// Executes a previously prepared statement by id.
    Execute { id: Vec<u8>, params: QueryParams },
    /// A batch of statements executed atomically (LOGGED) or not (UNLOGGED/COUNTER).
    Batch {
        batch_type: u8,
        statements: Vec<(BatchStatement, EncodedValues)>,
        consistency: u16,
        serial_consistency: Option<u16>,
        timestamp: Option<i64>,
    },
    /// Subscribes this connection to a set of server-pushed event types.
    Register { event_types: Vec<String> },
    /// The client's answer in an authentication challenge/response round-trip. The
    /// authenticator itself is an external collaborator (§1 scope); this crate only frames
    /// the opaque token.
    AuthResponse { token: Vec<u8> },
}

/// Encode a request body. The caller is responsible for wrapping the result in an envelope
/// (see [`crate::frame::encode_frame`]) with the matching [`crate::frame::OpCode`].
pub fn encode_request(body: &RequestBody) -> Vec<u8> {
    let mut out = Vec::new();
    match body {
        RequestBody::Startup { cql_version, compression } => {
            let mut options = HashMap::new();
            options.insert("CQL_VERSION".to_string(), cql_version.clone());
            if let Some(algorithm) = compression {
                options.insert("COMPRESSION".to_string(), algorithm.clone());
            }
            write_string_map(&mut out, &options);
        }
        RequestBody::Options => {}
        RequestBody::Query { statement, params } => {
            write_long_string(&mut out, statement);
            params.write(&mut out);
        }
        RequestBody::Prepare { statement } => {
            write_long_string(&mut out, statement);
        }
        RequestBody::Execute { id, params } => {
            write_short_bytes(&mut out, id);
            params.write(&mut out);
        }
        RequestBody::Batch {
            batch_type,
            statements,
            consistency,
            serial_consistency,
            timestamp,
        } => {
            out.push(*batch_type);
            write_short(&mut out, statements.len() as u16);
            for (statement, values) in statements {
                match statement {
                    BatchStatement::Query(cql) => {
                        out.push(0);
                        write_long_string(&mut out, cql);
                    }
                    BatchStatement::Prepared(id) => {
                        out.push(1);
                        write_short_bytes(&mut out, id);
                    }
                }
                out.extend_from_slice(&values.0);
            }
            write_short(&mut out, *consistency);
            let mut flags = 0u8;
            if serial_consistency.is_some() {
                flags |= query_flags::SERIAL_CONSISTENCY;
            }
            if timestamp.is_some() {
                flags |= query_flags::DEFAULT_TIMESTAMP;
            }
            out.push(flags);
            if let Some(sc) = serial_consistency {
                write_short(&mut out, *sc);
            }
            if let Some(ts) = timestamp {
                write_long(&mut out, *ts);
            }
        }
        RequestBody::Register { event_types } => {
            write_string_list(&mut out, event_types);
        }
        RequestBody::AuthResponse { token } => {
            write_bytes(&mut out, Some(token));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_encodes_cql_version_and_compression() {
        let body = RequestBody::Startup {
            cql_version: "3.0.0".to_string(),
            compression: Some("lz4".to_string()),
        };
        let encoded = encode_request(&body);
        let mut reader = super::primitives::Reader::new(&encoded);
        let n = reader.read_short().unwrap();
        assert_eq!(n, 2);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..n {
            seen.insert(reader.read_string().unwrap());
            reader.read_string().unwrap();
        }
        assert!(seen.contains("CQL_VERSION"));
        assert!(seen.contains("COMPRESSION"));
    }

    #[test]
    fn options_body_is_empty() {
        assert!(encode_request(&RequestBody::Options).is_empty());
    }

    #[test]
    fn query_without_values_has_no_values_flag() {
        let body = RequestBody::Query {
            statement: "SELECT * FROM t".to_string(),
            params: QueryParams {
                consistency: 1,
                ..Default::default()
            },
        };
        let encoded = encode_request(&body);
        let mut reader = super::primitives::Reader::new(&encoded);
        let statement = reader.read_long_string().unwrap();
        assert_eq!(statement, "SELECT * FROM t");
        let _consistency = reader.read_short().unwrap();
        let flags_pos = reader.remaining();
        assert_eq!(flags_pos[0] & query_flags::VALUES, 0);
    }

    #[test]
    fn execute_carries_prepared_id_as_short_bytes() {
        let body = RequestBody::Execute {
            id: vec![1, 2, 3, 4],
            params: QueryParams {
                consistency: 1,
                ..Default::default()
            },
        };
        let encoded = encode_request(&body);
        let mut reader = super::primitives::Reader::new(&encoded);
        let id = reader.read_short_bytes().unwrap();
        assert_eq!(id, vec![1, 2, 3, 4]);
    }
}
