// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The `Compressor` binding negotiated at STARTUP and used by both the v3/v4 body
//! compression flag and the v5 outer-segment compression mode.

mod lz4;
mod snappy;

pub use lz4::Lz4Compressor;
pub use snappy::SnappyCompressor;

/// A compression algorithm bound to a connection after STARTUP negotiation.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// The `COMPRESSION` option name as advertised by the server in SUPPORTED, e.g. `"lz4"`.
    fn algorithm(&self) -> &'static str;

    /// Compress a buffer. For v3/v4 body compression, callers are responsible for any
    /// length-prefix convention the algorithm needs; for v5 this crate strips/re-adds the
    /// prefix itself per §4.A.
    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress a buffer previously produced by [`Compressor::compress`].
    fn decompress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Length of any length-prefix this algorithm's [`Compressor::compress`] output carries
    /// ahead of the actual compressed bytes (e.g. LZ4's 4-byte big-endian uncompressed-length
    /// prefix). The v5 segment framer strips this prefix, since it stores the uncompressed
    /// length itself, and reattaches it before calling [`Compressor::decompress`].
    fn frame_prefix_len(&self) -> usize {
        0
    }
}

/// The two algorithms the native protocol commonly negotiates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompressionType {
    /// LZ4 block compression (the Cassandra wire convention prefixes a 4-byte big-endian
    /// uncompressed length).
    Lz4,
    /// Snappy framed compression.
    Snappy,
}

impl CompressionType {
    /// Construct the matching [`Compressor`] implementation.
    pub fn compressor(self) -> Box<dyn Compressor> {
        match self {
            CompressionType::Lz4 => Box::new(Lz4Compressor),
            CompressionType::Snappy => Box::new(SnappyCompressor),
        }
    }
}
