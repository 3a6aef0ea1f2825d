// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

use super::Compressor;

/// LZ4 block compression, with the native-protocol convention of a 4-byte
/// big-endian uncompressed-length prefix ahead of the compressed block.
#[derive(Debug, Default)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        let compressed = lz4::block::compress(input, None, false)?;
        let mut out = Vec::with_capacity(4 + compressed.len());
        out.extend_from_slice(&(input.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn decompress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::ensure!(input.len() >= 4, "lz4 payload missing length prefix");
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&input[..4]);
        let uncompressed_len = u32::from_be_bytes(len_bytes) as i32;
        Ok(lz4::block::decompress(&input[4..], Some(uncompressed_len))?)
    }

    fn frame_prefix_len(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let c = Lz4Compressor;
        let input = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = c.compress(&input).unwrap();
        let decompressed = c.decompress(&compressed).unwrap();
        assert_eq!(input, decompressed);
    }
}
