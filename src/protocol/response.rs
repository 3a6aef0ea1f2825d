// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Decoders for response bodies: ERROR, READY, AUTHENTICATE, SUPPORTED, RESULT, EVENT,
//! AUTH_CHALLENGE, AUTH_SUCCESS. Row/column value decoding inside RESULT bodies is an
//! external collaborator (§1 scope); this module stops at handing back the raw rows bytes
//! plus enough metadata for a caller to drive paging.

use super::primitives::Reader;
use crate::frame::{Envelope, OpCode};
use std::collections::HashMap;
use std::convert::TryFrom;

/// The native-protocol numeric error codes carried by an ERROR body.
#[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
#[repr(i32)]
pub enum ErrorCodes {
    ServerError = 0x0000,
    ProtocolError = 0x000A,
    AuthenticationError = 0x0100,
    Unavailable = 0x1000,
    Overloaded = 0x1001,
    IsBootstrapping = 0x1002,
    TruncateError = 0x1003,
    WriteTimeout = 0x1100,
    ReadTimeout = 0x1200,
    ReadFailure = 0x1300,
    FunctionFailure = 0x1400,
    WriteFailure = 0x1500,
    SyntaxError = 0x2000,
    Unauthorized = 0x2100,
    Invalid = 0x2200,
    ConfigError = 0x2300,
    AlreadyExists = 0x2400,
    Unprepared = 0x2500,
}

impl ErrorCodes {
    /// Parse a raw 32-bit error code, keeping any unrecognized code as `None`'s caller-visible
    /// analogue: `ServerError` is the safe fallback (matches native-protocol convention of
    /// code `0x0000` being the generic case).
    pub fn from_code(code: i32) -> Self {
        num_traits::FromPrimitive::from_i32(code).unwrap_or(ErrorCodes::ServerError)
    }
}

/// Metadata preceding a ROWS result body.
#[derive(Debug, Clone, Default)]
pub struct RowsMetadata {
    pub flags: i32,
    pub columns_count: i32,
    pub paging_state: Option<Vec<u8>>,
}

impl RowsMetadata {
    pub fn has_more_pages(&self) -> bool {
        self.flags & ROWS_FLAG_HAS_MORE_PAGES != 0
    }
}

/// The RESULT body kinds this core distinguishes. Column values inside `Rows` stay opaque.
#[derive(Debug, Clone)]
pub enum ResultBody {
    Void,
    Rows {
        metadata: RowsMetadata,
        /// The raw, not-yet-deserialized row bytes following the metadata.
        rows: Vec<u8>,
    },
    SetKeyspace(String),
    Prepared {
        id: Vec<u8>,
        /// The bind-variable metadata (flags, column count; column specs are parsed only far
        /// enough to be skipped, per the column-value scope boundary).
        metadata: RowsMetadata,
    },
    SchemaChange {
        change_type: String,
        target: String,
        keyspace: String,
        name: Option<String>,
    },
}

/// A server-pushed event, decoded down to the fields component E needs to act on.
#[derive(Debug, Clone)]
pub enum EventBody {
    TopologyChange { change_type: String, address: String, port: u16 },
    StatusChange { status: String, address: String, port: u16 },
    SchemaChange { change_type: String, target: String, keyspace: String },
}

/// A decoded response body, plus whatever warnings accompanied it.
#[derive(Debug, Clone)]
pub enum Response {
    Error { code: ErrorCodes, message: String, extra: Vec<u8> },
    Ready,
    Authenticate { authenticator: String },
    Supported { options: HashMap<String, Vec<String>> },
    Result(ResultBody),
    Event(EventBody),
    AuthChallenge { token: Option<Vec<u8>> },
    AuthSuccess { token: Option<Vec<u8>> },
}

/// Decode a response body given its envelope. Returns the decoded response and any warnings
/// (populated only when the WARNING flag was set, per §3).
pub fn decode_response(envelope: &Envelope) -> anyhow::Result<(Response, Vec<String>)> {
    let mut reader = Reader::new(&envelope.body);
    let warnings = if envelope.header.flags().warning() {
        reader.read_string_list()?
    } else {
        Vec::new()
    };

    let response = match envelope.header.opcode() {
        OpCode::Error => {
            let code = reader.read_int()?;
            let message = reader.read_string()?;
            let extra = reader.remaining().to_vec();
            Response::Error { code: ErrorCodes::from_code(code), message, extra }
        }
        OpCode::Ready => Response::Ready,
        OpCode::Authenticate => Response::Authenticate {
            authenticator: reader.read_string()?,
        },
        OpCode::Supported => Response::Supported {
            options: reader.read_string_multimap()?,
        },
        OpCode::Result => Response::Result(decode_result(&mut reader)?),
        OpCode::Event => Response::Event(decode_event(&mut reader)?),
        OpCode::AuthChallenge => Response::AuthChallenge {
            token: reader.read_bytes()?,
        },
        OpCode::AuthSuccess => Response::AuthSuccess {
            token: reader.read_bytes()?,
        },
        other => anyhow::bail!("{:?} is not a response opcode", other),
    };

    Ok((response, warnings))
}

const RESULT_KIND_VOID: i32 = 0x0001;
const RESULT_KIND_ROWS: i32 = 0x0002;
const RESULT_KIND_SET_KEYSPACE: i32 = 0x0003;
const RESULT_KIND_PREPARED: i32 = 0x0004;
const RESULT_KIND_SCHEMA_CHANGE: i32 = 0x0005;

const ROWS_FLAG_GLOBAL_TABLES_SPEC: i32 = 0x0001;
const ROWS_FLAG_HAS_MORE_PAGES: i32 = 0x0002;
const ROWS_FLAG_NO_METADATA: i32 = 0x0004;

fn decode_result(reader: &mut Reader) -> anyhow::Result<ResultBody> {
    let kind = reader.read_int()?;
    Ok(match kind {
        RESULT_KIND_VOID => ResultBody::Void,
        RESULT_KIND_ROWS => {
            let flags = reader.read_int()?;
            let columns_count = reader.read_int()?;
            let paging_state = if flags & ROWS_FLAG_HAS_MORE_PAGES != 0 { reader.read_bytes()? } else { None };
            if flags & ROWS_FLAG_NO_METADATA == 0 {
                skip_column_specs(reader, flags, columns_count)?;
            }
            ResultBody::Rows {
                metadata: RowsMetadata { flags, columns_count, paging_state },
                rows: reader.remaining().to_vec(),
            }
        }
        RESULT_KIND_SET_KEYSPACE => ResultBody::SetKeyspace(reader.read_string()?),
        RESULT_KIND_PREPARED => {
            let id = reader.read_short_bytes()?;
            // Bind-variable metadata: flags, column count, then (v4+) a partition-key index
            // ahead of the column specs themselves.
            let flags = reader.read_int()?;
            let columns_count = reader.read_int()?;
            let pk_count = reader.read_int()?;
            for _ in 0..pk_count {
                reader.read_short()?;
            }
            if flags & ROWS_FLAG_NO_METADATA == 0 {
                skip_column_specs(reader, flags, columns_count)?;
            }
            // result_metadata follows, shaped exactly like a plain ROWS metadata block; this
            // core only needs to consume it, nothing follows it in the body.
            let result_flags = reader.read_int()?;
            let result_columns_count = reader.read_int()?;
            if result_flags & ROWS_FLAG_HAS_MORE_PAGES != 0 {
                reader.read_bytes()?;
            }
            if result_flags & ROWS_FLAG_NO_METADATA == 0 {
                skip_column_specs(reader, result_flags, result_columns_count)?;
            }
            ResultBody::Prepared {
                id,
                metadata: RowsMetadata { flags, columns_count, paging_state: None },
            }
        }
        RESULT_KIND_SCHEMA_CHANGE => {
            let change_type = reader.read_string()?;
            let target = reader.read_string()?;
            let keyspace = reader.read_string()?;
            let name = if target != "KEYSPACE" { Some(reader.read_string()?) } else { None };
            ResultBody::SchemaChange { change_type, target, keyspace, name }
        }
        other => anyhow::bail!("unknown RESULT kind {:#06x}", other),
    })
}

/// Skip past `columns_count` column specs (global-tables-spec aware) without interpreting
/// them: the column-value decoder is an external collaborator, but this core still needs to
/// walk past the variable-length column type descriptors to reach the row bytes that follow.
fn skip_column_specs(reader: &mut Reader, flags: i32, columns_count: i32) -> anyhow::Result<()> {
    let global_tables_spec = flags & ROWS_FLAG_GLOBAL_TABLES_SPEC != 0;
    if global_tables_spec {
        reader.read_string()?; // keyspace
        reader.read_string()?; // table
    }
    for _ in 0..columns_count {
        if !global_tables_spec {
            reader.read_string()?; // keyspace
            reader.read_string()?; // table
        }
        reader.read_string()?; // column name
        skip_column_type(reader)?;
    }
    Ok(())
}

/// Skip one `[option]` column type descriptor, recursing into collection/UDT/tuple element
/// types so nested specs are fully consumed.
fn skip_column_type(reader: &mut Reader) -> anyhow::Result<()> {
    const CUSTOM: u16 = 0x0000;
    const LIST: u16 = 0x0020;
    const MAP: u16 = 0x0021;
    const SET: u16 = 0x0022;
    const UDT: u16 = 0x0030;
    const TUPLE: u16 = 0x0031;

    let id = reader.read_short()?;
    match id {
        CUSTOM => {
            reader.read_string()?;
        }
        LIST | SET => skip_column_type(reader)?,
        MAP => {
            skip_column_type(reader)?;
            skip_column_type(reader)?;
        }
        UDT => {
            reader.read_string()?; // keyspace
            reader.read_string()?; // udt name
            let n = reader.read_short()?;
            for _ in 0..n {
                reader.read_string()?; // field name
                skip_column_type(reader)?;
            }
        }
        TUPLE => {
            let n = reader.read_short()?;
            for _ in 0..n {
                skip_column_type(reader)?;
            }
        }
        _ => {} // fixed-width primitive types carry no extra payload
    }
    Ok(())
}

fn decode_event(reader: &mut Reader) -> anyhow::Result<EventBody> {
    let event_type = reader.read_string()?;
    Ok(match event_type.as_str() {
        "TOPOLOGY_CHANGE" => {
            let change_type = reader.read_string()?;
            let (address, port) = read_inet(reader)?;
            EventBody::TopologyChange { change_type, address, port }
        }
        "STATUS_CHANGE" => {
            let status = reader.read_string()?;
            let (address, port) = read_inet(reader)?;
            EventBody::StatusChange { status, address, port }
        }
        "SCHEMA_CHANGE" => {
            let change_type = reader.read_string()?;
            let target = reader.read_string()?;
            let keyspace = reader.read_string()?;
            EventBody::SchemaChange { change_type, target, keyspace }
        }
        other => anyhow::bail!("unknown event type {}", other),
    })
}

/// `[inet]`: a one-byte address length (4 for IPv4, 16 for IPv6) followed by the address
/// bytes and a 4-byte port.
fn read_inet(reader: &mut Reader) -> anyhow::Result<(String, u16)> {
    let remaining = reader.remaining();
    anyhow::ensure!(!remaining.is_empty(), "truncated inet: missing length byte");
    let len = remaining[0] as usize;
    anyhow::ensure!(remaining.len() >= 1 + len + 4, "truncated inet");
    let addr_bytes = &remaining[1..1 + len];
    let address = match len {
        4 => std::net::IpAddr::from(<[u8; 4]>::try_from(addr_bytes)?).to_string(),
        16 => std::net::IpAddr::from(<[u8; 16]>::try_from(addr_bytes)?).to_string(),
        other => anyhow::bail!("unsupported inet address length {}", other),
    };
    let port_bytes = &remaining[1 + len..1 + len + 4];
    let port = i32::from_be_bytes(port_bytes.try_into().unwrap()) as u16;
    reader.advance(1 + len + 4);
    Ok((address, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::header::{Header, ProtocolVersion};
    use crate::protocol::primitives::{write_int, write_short, write_short_bytes, write_string};

    fn envelope(opcode: OpCode, body: Vec<u8>) -> Envelope {
        Envelope {
            header: Header::request(ProtocolVersion::V4, 0, opcode),
            body,
        }
    }

    #[test]
    fn ready_has_no_body() {
        let e = envelope(OpCode::Ready, vec![]);
        let (resp, warnings) = decode_response(&e).unwrap();
        assert!(matches!(resp, Response::Ready));
        assert!(warnings.is_empty());
    }

    #[test]
    fn error_decodes_code_and_message() {
        let mut body = Vec::new();
        write_int(&mut body, 0x2000);
        write_string(&mut body, "line 1:0 syntax error");
        let e = envelope(OpCode::Error, body);
        let (resp, _) = decode_response(&e).unwrap();
        match resp {
            Response::Error { code, message, .. } => {
                assert_eq!(code, ErrorCodes::SyntaxError);
                assert_eq!(message, "line 1:0 syntax error");
            }
            _ => panic!("expected error"),
        }
    }

    #[test]
    fn authenticate_decodes_authenticator_name() {
        let mut body = Vec::new();
        write_string(&mut body, "org.apache.cassandra.auth.PasswordAuthenticator");
        let e = envelope(OpCode::Authenticate, body);
        let (resp, _) = decode_response(&e).unwrap();
        match resp {
            Response::Authenticate { authenticator } => {
                assert_eq!(authenticator, "org.apache.cassandra.auth.PasswordAuthenticator")
            }
            _ => panic!("expected authenticate"),
        }
    }

    #[test]
    fn result_void_decodes() {
        let mut body = Vec::new();
        write_int(&mut body, RESULT_KIND_VOID);
        let e = envelope(OpCode::Result, body);
        let (resp, _) = decode_response(&e).unwrap();
        assert!(matches!(resp, Response::Result(ResultBody::Void)));
    }

    #[test]
    fn result_set_keyspace_decodes() {
        let mut body = Vec::new();
        write_int(&mut body, RESULT_KIND_SET_KEYSPACE);
        write_string(&mut body, "my_keyspace");
        let e = envelope(OpCode::Result, body);
        let (resp, _) = decode_response(&e).unwrap();
        match resp {
            Response::Result(ResultBody::SetKeyspace(ks)) => assert_eq!(ks, "my_keyspace"),
            _ => panic!("expected set keyspace"),
        }
    }

    #[test]
    fn result_rows_with_metadata_skips_to_row_bytes() {
        const COLUMN_TYPE_VARCHAR: u16 = 0x000D;
        let mut body = Vec::new();
        write_int(&mut body, RESULT_KIND_ROWS);
        write_int(&mut body, ROWS_FLAG_GLOBAL_TABLES_SPEC);
        write_int(&mut body, 1); // columns_count
        write_string(&mut body, "system"); // global keyspace
        write_string(&mut body, "local"); // global table
        write_string(&mut body, "key"); // column name
        write_short(&mut body, COLUMN_TYPE_VARCHAR);
        let row_bytes = [0xAA, 0xBB, 0xCC, 0xDD];
        body.extend_from_slice(&row_bytes);
        let e = envelope(OpCode::Result, body);
        let (resp, _) = decode_response(&e).unwrap();
        match resp {
            Response::Result(ResultBody::Rows { metadata, rows }) => {
                assert_eq!(metadata.columns_count, 1);
                assert_eq!(rows, row_bytes);
            }
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn result_prepared_decodes_id_and_skips_both_metadata_blocks() {
        let mut body = Vec::new();
        write_int(&mut body, RESULT_KIND_PREPARED);
        write_short_bytes(&mut body, &[0x01, 0x02]); // prepared id
        // bind-variable metadata: global tables spec, one bound variable, no pk index
        write_int(&mut body, ROWS_FLAG_GLOBAL_TABLES_SPEC);
        write_int(&mut body, 1); // columns_count
        write_int(&mut body, 0); // pk_count
        write_string(&mut body, "system"); // global keyspace
        write_string(&mut body, "local"); // global table
        write_string(&mut body, "key"); // column name
        write_short(&mut body, 0x000D); // varchar
        // result_metadata: no columns
        write_int(&mut body, ROWS_FLAG_NO_METADATA);
        write_int(&mut body, 0);
        let e = envelope(OpCode::Result, body);
        let (resp, _) = decode_response(&e).unwrap();
        match resp {
            Response::Result(ResultBody::Prepared { id, metadata }) => {
                assert_eq!(id, vec![0x01, 0x02]);
                assert_eq!(metadata.columns_count, 1);
            }
            _ => panic!("expected prepared"),
        }
    }
}
