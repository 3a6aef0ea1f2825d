// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! CRC24 (header) and CRC32 (payload) as used by the v5 outer segment framing.

use crc::{Crc, CRC_24_OPENPGP, CRC_32_ISO_HDLC};

static CRC24: Crc<u32> = Crc::<u32>::new(&CRC_24_OPENPGP);
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC24 of a v5 segment header-data, returned as 3 little-endian bytes.
pub fn crc24(header_data: &[u8]) -> [u8; 3] {
    let digest = CRC24.checksum(header_data);
    [digest as u8, (digest >> 8) as u8, (digest >> 16) as u8]
}

/// Verify a header-data block against its accompanying 3-byte little-endian CRC24.
pub fn verify_crc24(header_data: &[u8], expected: [u8; 3]) -> bool {
    crc24(header_data) == expected
}

/// Compute the CRC32 of a v5 segment payload, returned as 4 little-endian bytes.
pub fn crc32(payload: &[u8]) -> [u8; 4] {
    CRC32.checksum(payload).to_le_bytes()
}

/// Verify a payload against its accompanying 4-byte little-endian CRC32.
pub fn verify_crc32(payload: &[u8], expected: [u8; 4]) -> bool {
    crc32(payload) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc24_detects_single_bit_flips() {
        let data = [0x01, 0x02, 0x03];
        let good = crc24(&data);
        for bit in 0..24 {
            let mut mutated = data;
            mutated[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify_crc24(&mutated, good));
        }
    }

    #[test]
    fn crc32_detects_single_bit_flips() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let good = crc32(data);
        for bit in 0..(data.len() * 8) {
            let mut mutated = data.to_vec();
            mutated[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify_crc32(&mutated, good));
        }
    }
}
