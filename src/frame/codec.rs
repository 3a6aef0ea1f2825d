// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Encoding/decoding of v3/v4 envelopes: a 9-byte header followed by an (optionally
//! compressed) body. See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec`.

use super::header::{Header, ProtocolVersion, HEADER_LENGTH};
use super::opcode::OpCode;
use crate::compression::Compressor;
use crate::error::ProtocolError;
use std::convert::TryFrom;

/// A decoded envelope: header plus the (already decompressed) body.
#[derive(Debug)]
pub struct Envelope {
    /// The envelope header.
    pub header: Header,
    /// The envelope body, decompressed if it arrived compressed.
    pub body: Vec<u8>,
}

/// Compression applies only after STARTUP because the peer must first learn the algorithm.
fn compression_eligible(opcode: OpCode) -> bool {
    !matches!(opcode, OpCode::Startup | OpCode::Options)
}

/// Encode a v3/v4 envelope. If `compressor` is bound, `body` is non-empty, and the opcode
/// is eligible, the body is compressed and the compression flag is set.
pub fn encode_envelope(
    protocol: ProtocolVersion,
    stream: i16,
    opcode: OpCode,
    mut body: Vec<u8>,
    compressor: Option<&dyn Compressor>,
) -> anyhow::Result<Vec<u8>> {
    let mut header = Header::request(protocol, stream, opcode);
    if let (Some(compressor), false, true) = (compressor, body.is_empty(), compression_eligible(opcode)) {
        body = compressor.compress(&body)?;
        header.flags_mut().set_compression(true);
    }
    header.set_body_len(body.len() as u32);
    let mut out = Vec::with_capacity(HEADER_LENGTH + body.len());
    out.extend_from_slice(&<[u8; HEADER_LENGTH]>::from(header));
    out.extend_from_slice(&body);
    Ok(out)
}

/// Attempt to decode one envelope from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a complete envelope (the caller should
/// wait for more bytes). On success returns the decoded envelope and how many bytes of `buf`
/// it consumed.
pub fn decode_envelope(
    buf: &[u8],
    compressor: Option<&dyn Compressor>,
) -> Result<Option<(Envelope, usize)>, ProtocolError> {
    if buf.len() < HEADER_LENGTH {
        return Ok(None);
    }
    let header = Header::try_from(&buf[..HEADER_LENGTH])
        .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    let body_len = header.body_len() as usize;
    let total = HEADER_LENGTH + body_len;
    if buf.len() < total {
        return Ok(None);
    }
    let raw_body = &buf[HEADER_LENGTH..total];
    let body = if header.flags().compression() {
        let compressor = compressor.ok_or_else(|| {
            ProtocolError::MalformedFrame("compression flag set but no compressor bound".into())
        })?;
        compressor
            .decompress(raw_body)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?
    } else {
        raw_body.to_vec()
    };
    Ok(Some((Envelope { header, body }, total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Lz4Compressor;

    #[test]
    fn round_trip_uncompressed() {
        let body = b"SELECT * FROM system.local".to_vec();
        let encoded = encode_envelope(ProtocolVersion::V4, 7, OpCode::Query, body.clone(), None).unwrap();
        let (envelope, consumed) = decode_envelope(&encoded, None).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(envelope.header.stream(), 7);
        assert_eq!(envelope.header.opcode(), OpCode::Query);
        assert_eq!(envelope.body, body);
    }

    #[test]
    fn round_trip_compressed() {
        let compressor = Lz4Compressor;
        let body = b"SELECT * FROM system.local".repeat(50);
        let encoded =
            encode_envelope(ProtocolVersion::V4, 3, OpCode::Query, body.clone(), Some(&compressor)).unwrap();
        let (envelope, consumed) = decode_envelope(&encoded, Some(&compressor)).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(envelope.body, body);
    }

    #[test]
    fn startup_is_never_compressed() {
        let compressor = Lz4Compressor;
        let body = b"{}".to_vec();
        let encoded =
            encode_envelope(ProtocolVersion::V4, 0, OpCode::Startup, body.clone(), Some(&compressor)).unwrap();
        let (envelope, _) = decode_envelope(&encoded, Some(&compressor)).unwrap().unwrap();
        assert!(!envelope.header.flags().compression());
        assert_eq!(envelope.body, body);
    }

    #[test]
    fn insufficient_data_yields_none() {
        let body = b"hello".to_vec();
        let encoded = encode_envelope(ProtocolVersion::V4, 1, OpCode::Query, body, None).unwrap();
        assert!(decode_envelope(&encoded[..HEADER_LENGTH - 1], None).unwrap().is_none());
        assert!(decode_envelope(&encoded[..encoded.len() - 1], None).unwrap().is_none());
    }

    #[test]
    fn compression_flag_without_compressor_is_malformed() {
        let compressor = Lz4Compressor;
        let body = b"x".repeat(20);
        let encoded =
            encode_envelope(ProtocolVersion::V4, 1, OpCode::Query, body, Some(&compressor)).unwrap();
        assert!(matches!(decode_envelope(&encoded, None), Err(ProtocolError::MalformedFrame(_))));
    }
}
