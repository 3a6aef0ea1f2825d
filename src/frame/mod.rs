// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The wire-frame codec: encoding/decoding of protocol v3/v4 envelopes and of the v5
//! self-contained/multi-segment outer framing (CRC24/CRC32, optional per-segment compression).
//! See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec` and the v5
//! framing addendum for more details.

pub mod codec;
pub mod crc;
pub mod header;
pub mod opcode;
pub mod segment;

pub use codec::Envelope;
pub use header::{Direction, Header, HeaderFlags, ProtocolVersion, Version, HEADER_LENGTH};
pub use opcode::OpCode;
pub use segment::MAX_SEGMENT_PAYLOAD;

use crate::compression::Compressor;
use crate::error::ProtocolError;

/// Encode a complete on-wire frame for the given protocol generation: a plain v3/v4 envelope,
/// or (for v5) that same envelope wrapped in one or more CRC-protected outer segments.
///
/// For v5, the inner envelope is built *without* the compression flag (compression migrates
/// to the outer segment layer), regardless of whether `compressor` is set.
pub fn encode_frame(
    protocol: ProtocolVersion,
    stream: i16,
    opcode: OpCode,
    body: Vec<u8>,
    compressor: Option<&dyn Compressor>,
) -> anyhow::Result<Vec<u8>> {
    if protocol.has_segment_framing() {
        let inner = codec::encode_envelope(protocol, stream, opcode, body, None)?;
        segment::encode_segments(&inner, compressor)
    } else {
        codec::encode_envelope(protocol, stream, opcode, body, compressor)
    }
}

/// Attempt to decode one complete frame from the front of `buf`, given the protocol
/// generation in force on this connection. Returns `Ok(None)` when `buf` holds an incomplete
/// frame; the caller should wait for more bytes.
pub fn decode_frame(
    buf: &[u8],
    protocol: ProtocolVersion,
    compressor: Option<&dyn Compressor>,
) -> Result<Option<(Envelope, usize)>, ProtocolError> {
    if protocol.has_segment_framing() {
        match segment::decode_segments(buf, compressor)? {
            None => Ok(None),
            Some((inner, consumed)) => {
                let (envelope, inner_consumed) = codec::decode_envelope(&inner, None)?
                    .ok_or_else(|| ProtocolError::MalformedFrame("truncated v5 inner envelope".into()))?;
                debug_assert_eq!(inner_consumed, inner.len());
                Ok(Some((envelope, consumed)))
            }
        }
    } else {
        codec::decode_envelope(buf, compressor)
    }
}
