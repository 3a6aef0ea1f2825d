// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

use super::Compressor;

/// Snappy framed compression, no length prefix convention beyond what `snap` itself emits.
#[derive(Debug, Default)]
pub struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn algorithm(&self) -> &'static str {
        "snappy"
    }

    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(snap::raw::Encoder::new().compress_vec(input)?)
    }

    fn decompress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(snap::raw::Decoder::new().decompress_vec(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let c = SnappyCompressor;
        let input = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = c.compress(&input).unwrap();
        let decompressed = c.decompress(&compressed).unwrap();
        assert_eq!(input, decompressed);
    }
}
