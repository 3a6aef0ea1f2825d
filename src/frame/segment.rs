// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Protocol v5 outer segment framing: splits/reassembles an inner envelope into
//! CRC24/CRC32-protected, optionally compressed segments of at most 131,071 bytes.

use super::crc::{crc24, crc32, verify_crc24, verify_crc32};
use crate::compression::Compressor;
use crate::error::ProtocolError;

/// Max inner payload carried by a single v5 segment.
pub const MAX_SEGMENT_PAYLOAD: usize = 131_071;

const HEADER_DATA_LEN_UNCOMPRESSED: usize = 3;
const HEADER_DATA_LEN_COMPRESSED: usize = 5;
const CRC24_LEN: usize = 3;
const CRC32_LEN: usize = 4;

/// Split `inner` (a fully encoded v3/v4-shaped envelope, sent *without* the compression flag
/// since compression migrates to this outer layer) into one or more wire-ready v5 segments.
pub fn encode_segments(inner: &[u8], compressor: Option<&dyn Compressor>) -> anyhow::Result<Vec<u8>> {
    if inner.len() <= MAX_SEGMENT_PAYLOAD {
        return encode_one_segment(inner, true, compressor);
    }
    let mut out = Vec::new();
    for chunk in inner.chunks(MAX_SEGMENT_PAYLOAD) {
        out.extend(encode_one_segment(chunk, false, compressor)?);
    }
    Ok(out)
}

fn encode_one_segment(
    payload: &[u8],
    self_contained: bool,
    compressor: Option<&dyn Compressor>,
) -> anyhow::Result<Vec<u8>> {
    match compressor {
        None => {
            let value: u32 = (payload.len() as u32) | ((self_contained as u32) << 17);
            let header_data = value.to_le_bytes();
            let header_data = &header_data[..HEADER_DATA_LEN_UNCOMPRESSED];
            let mut out = Vec::with_capacity(header_data.len() + CRC24_LEN + payload.len() + CRC32_LEN);
            out.extend_from_slice(header_data);
            out.extend_from_slice(&crc24(header_data));
            out.extend_from_slice(payload);
            out.extend_from_slice(&crc32(payload));
            Ok(out)
        }
        Some(compressor) => {
            let compressed = compressor.compress(payload)?;
            let prefix_len = compressor.frame_prefix_len();
            let candidate = &compressed[prefix_len..];
            // Don't bother if compression didn't help; a zero uncompressed-length field is
            // the on-wire signal that this particular segment was sent raw.
            let (uncompressed_len, wire_payload): (u32, &[u8]) = if candidate.len() < payload.len() {
                (payload.len() as u32, candidate)
            } else {
                (0, payload)
            };
            let value: u64 = (wire_payload.len() as u64)
                | ((uncompressed_len as u64) << 17)
                | ((self_contained as u64) << 34);
            let header_data = value.to_le_bytes();
            let header_data = &header_data[..HEADER_DATA_LEN_COMPRESSED];
            let mut out =
                Vec::with_capacity(header_data.len() + CRC24_LEN + wire_payload.len() + CRC32_LEN);
            out.extend_from_slice(header_data);
            out.extend_from_slice(&crc24(header_data));
            out.extend_from_slice(wire_payload);
            out.extend_from_slice(&crc32(wire_payload));
            Ok(out)
        }
    }
}

struct DecodedSegment {
    self_contained: bool,
    payload_len: usize,
    payload: Vec<u8>,
}

fn decode_one_segment(
    buf: &[u8],
    compressor: Option<&dyn Compressor>,
) -> Result<Option<(DecodedSegment, usize)>, ProtocolError> {
    let header_data_len = if compressor.is_some() {
        HEADER_DATA_LEN_COMPRESSED
    } else {
        HEADER_DATA_LEN_UNCOMPRESSED
    };
    let header_total = header_data_len + CRC24_LEN;
    if buf.len() < header_total {
        return Ok(None);
    }
    let header_data = &buf[..header_data_len];
    let mut crc = [0u8; CRC24_LEN];
    crc.copy_from_slice(&buf[header_data_len..header_total]);
    if !verify_crc24(header_data, crc) {
        return Err(ProtocolError::CrcHeader);
    }

    let (payload_len, uncompressed_len, self_contained) = if compressor.is_some() {
        let mut padded = [0u8; 8];
        padded[..HEADER_DATA_LEN_COMPRESSED].copy_from_slice(header_data);
        let value = u64::from_le_bytes(padded);
        let payload_len = (value & 0x1_ffff) as usize;
        let uncompressed_len = ((value >> 17) & 0x1_ffff) as usize;
        let self_contained = (value >> 34) & 1 == 1;
        (payload_len, uncompressed_len, self_contained)
    } else {
        let mut padded = [0u8; 4];
        padded[..HEADER_DATA_LEN_UNCOMPRESSED].copy_from_slice(header_data);
        let value = u32::from_le_bytes(padded);
        let payload_len = (value & 0x1_ffff) as usize;
        let self_contained = (value >> 17) & 1 == 1;
        (payload_len, 0, self_contained)
    };

    let payload_total = payload_len + CRC32_LEN;
    if buf.len() < header_total + payload_total {
        return Ok(None);
    }
    let wire_payload = &buf[header_total..header_total + payload_len];
    let mut payload_crc = [0u8; CRC32_LEN];
    payload_crc.copy_from_slice(&buf[header_total + payload_len..header_total + payload_total]);
    if !verify_crc32(wire_payload, payload_crc) {
        return Err(ProtocolError::CrcPayload);
    }

    let payload = if let (Some(compressor), true) = (compressor, uncompressed_len > 0) {
        let prefix_len = compressor.frame_prefix_len();
        let mut reattached = Vec::with_capacity(prefix_len + wire_payload.len());
        reattached.extend_from_slice(&(uncompressed_len as u32).to_be_bytes()[4 - prefix_len..]);
        reattached.extend_from_slice(wire_payload);
        compressor
            .decompress(&reattached)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?
    } else {
        wire_payload.to_vec()
    };

    Ok(Some((
        DecodedSegment {
            self_contained,
            payload_len,
            payload,
        },
        header_total + payload_total,
    )))
}

/// Attempt to decode and reassemble one or more v5 segments from the front of `buf` into a
/// complete inner envelope. Returns `Ok(None)` if `buf` does not yet hold a terminal segment.
pub fn decode_segments(
    buf: &[u8],
    compressor: Option<&dyn Compressor>,
) -> Result<Option<(Vec<u8>, usize)>, ProtocolError> {
    let mut consumed = 0;
    let mut reassembled = Vec::new();
    loop {
        let remaining = &buf[consumed..];
        match decode_one_segment(remaining, compressor)? {
            None => return Ok(None),
            Some((segment, used)) => {
                consumed += used;
                let terminal = segment.self_contained || segment.payload_len < MAX_SEGMENT_PAYLOAD;
                reassembled.extend(segment.payload);
                if terminal {
                    return Ok(Some((reassembled, consumed)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Lz4Compressor;

    fn round_trip(len: usize, compressor: Option<&dyn Compressor>) {
        let inner: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let encoded = encode_segments(&inner, compressor).unwrap();
        let (decoded, consumed) = decode_segments(&encoded, compressor).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, inner);
    }

    #[test]
    fn segmentation_round_trip_uncompressed() {
        for len in [0, 1, 131_070, 131_071, 131_072, 500_000] {
            round_trip(len, None);
        }
    }

    #[test]
    fn segmentation_round_trip_compressed() {
        let compressor = Lz4Compressor;
        for len in [0, 1, 131_070, 131_071, 131_072, 500_000] {
            round_trip(len, Some(&compressor));
        }
    }

    #[test]
    fn single_segment_is_self_contained() {
        let inner = vec![1, 2, 3];
        let encoded = encode_segments(&inner, None).unwrap();
        let (decoded, consumed) = decode_one_segment(&encoded, None).unwrap().unwrap();
        assert!(decoded.self_contained);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn multi_segment_only_last_is_short() {
        let inner = vec![0u8; MAX_SEGMENT_PAYLOAD * 2 + 10];
        let encoded = encode_segments(&inner, None).unwrap();
        let mut offset = 0;
        let mut segments = Vec::new();
        while offset < encoded.len() {
            let (seg, used) = decode_one_segment(&encoded[offset..], None).unwrap().unwrap();
            offset += used;
            segments.push(seg);
        }
        assert_eq!(segments.len(), 3);
        assert!(!segments[0].self_contained);
        assert!(!segments[1].self_contained);
        assert_eq!(segments[0].payload_len, MAX_SEGMENT_PAYLOAD);
        assert_eq!(segments[1].payload_len, MAX_SEGMENT_PAYLOAD);
        assert!(segments[2].payload_len < MAX_SEGMENT_PAYLOAD);
    }

    #[test]
    fn header_crc_mismatch_is_detected() {
        let inner = vec![1, 2, 3, 4, 5];
        let mut encoded = encode_segments(&inner, None).unwrap();
        encoded[0] ^= 0xff;
        assert!(matches!(decode_segments(&encoded, None), Err(ProtocolError::CrcHeader)));
    }

    #[test]
    fn payload_crc_mismatch_is_detected() {
        let inner = vec![1, 2, 3, 4, 5];
        let mut encoded = encode_segments(&inner, None).unwrap();
        let header_total = HEADER_DATA_LEN_UNCOMPRESSED + CRC24_LEN;
        encoded[header_total] ^= 0xff;
        assert!(matches!(decode_segments(&encoded, None), Err(ProtocolError::CrcPayload)));
    }
}
