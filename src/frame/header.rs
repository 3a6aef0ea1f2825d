// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! This module defines the envelope header: version, flags, stream id, opcode, body length.

use super::opcode::OpCode;
use std::convert::{TryFrom, TryInto};

/// Direction of a request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Request,
    Response,
}

/// The three native-protocol generations this crate speaks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[allow(missing_docs)]
pub enum ProtocolVersion {
    V3,
    V4,
    V5,
}

impl ProtocolVersion {
    /// The raw request-direction version byte (`0x0V`).
    pub fn request_byte(self) -> u8 {
        match self {
            ProtocolVersion::V3 => 0x03,
            ProtocolVersion::V4 => 0x04,
            ProtocolVersion::V5 => 0x05,
        }
    }

    /// Whether this generation uses v5 outer segment framing.
    pub fn has_segment_framing(self) -> bool {
        matches!(self, ProtocolVersion::V5)
    }

    /// Parse the bare version number (without the direction bit) back into a [`ProtocolVersion`].
    pub fn from_raw(v: u8) -> anyhow::Result<Self> {
        Ok(match v & 0x7f {
            0x03 => ProtocolVersion::V3,
            0x04 => ProtocolVersion::V4,
            0x05 => ProtocolVersion::V5,
            other => anyhow::bail!("unsupported protocol version {}", other),
        })
    }
}

/**
    The version is a single byte that indicates both the direction of the message
    (request or response) and the version of the protocol in use. The most
    significant bit is the direction: 0 request, 1 response. The rest of the byte
    is the protocol version (3, 4 or 5 for the generations this crate speaks).
*/
#[derive(Copy, Clone, Debug)]
pub struct Version(u8);

impl Version {
    /// Build a request-direction version byte for the given protocol generation.
    pub fn request(protocol: ProtocolVersion) -> Self {
        Self(protocol.request_byte())
    }

    /// The direction of the frame, either request or response.
    pub fn direction(&self) -> Direction {
        match self.0 & 0x80 {
            0 => Direction::Request,
            _ => Direction::Response,
        }
    }

    /// The protocol generation of the frame.
    pub fn protocol(&self) -> anyhow::Result<ProtocolVersion> {
        ProtocolVersion::from_raw(self.0)
    }

    /// The raw byte as it appears on the wire.
    pub fn raw(&self) -> u8 {
        self.0
    }
}

/**
    Flags applying to this frame (masks select individual bits):

    - `0x01`: Compression. Set only after STARTUP has negotiated an algorithm.
    - `0x02`: Tracing.
    - `0x04`: Custom payload.
    - `0x08`: Warning (response only).
    - `0x10`: Use beta (client opts into an unreleased protocol version).
*/
#[derive(Copy, Clone, Debug, Default)]
#[repr(transparent)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    /// The compression flag.
    pub const COMPRESSION: u8 = 0x01;
    /// The tracing flag.
    pub const TRACING: u8 = 0x02;
    /// The custom payload flag.
    pub const CUSTOM_PAYLOAD: u8 = 0x04;
    /// The warning flag.
    pub const WARNING: u8 = 0x08;
    /// The use-beta flag.
    pub const USE_BETA: u8 = 0x10;

    /// Construct flags from a raw byte.
    pub fn from_raw(byte: u8) -> Self {
        HeaderFlags(byte)
    }

    /// The raw byte as it appears on the wire.
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Compression flag.
    pub fn compression(&self) -> bool {
        self.0 & Self::COMPRESSION != 0
    }

    /// Set the compression flag.
    pub fn set_compression(&mut self, value: bool) {
        self.set(Self::COMPRESSION, value);
    }

    /// Tracing flag.
    pub fn tracing(&self) -> bool {
        self.0 & Self::TRACING != 0
    }

    /// Set the tracing flag.
    pub fn set_tracing(&mut self, value: bool) {
        self.set(Self::TRACING, value);
    }

    /// Custom payload flag.
    pub fn custom_payload(&self) -> bool {
        self.0 & Self::CUSTOM_PAYLOAD != 0
    }

    /// Set the custom payload flag.
    pub fn set_custom_payload(&mut self, value: bool) {
        self.set(Self::CUSTOM_PAYLOAD, value);
    }

    /// Warning flag.
    pub fn warning(&self) -> bool {
        self.0 & Self::WARNING != 0
    }

    /// Use-beta flag.
    pub fn use_beta(&self) -> bool {
        self.0 & Self::USE_BETA != 0
    }

    fn set(&mut self, mask: u8, value: bool) {
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }
}

/// The full header of an envelope: protocol version, flags, stream id, opcode, body length.
#[derive(Copy, Clone, Debug)]
pub struct Header {
    version: Version,
    flags: HeaderFlags,
    stream: i16,
    opcode: OpCode,
    body_len: u32,
}

impl Header {
    /// Build a request header for the given protocol generation, stream id, and opcode.
    pub fn request(protocol: ProtocolVersion, stream: i16, opcode: OpCode) -> Self {
        Self {
            version: Version::request(protocol),
            flags: HeaderFlags::default(),
            stream,
            opcode,
            body_len: 0,
        }
    }

    /// The direction of the frame.
    pub fn direction(&self) -> Direction {
        self.version.direction()
    }

    /// The protocol generation of the frame.
    pub fn protocol(&self) -> anyhow::Result<ProtocolVersion> {
        self.version.protocol()
    }

    /// The flags of the frame.
    pub fn flags(&self) -> &HeaderFlags {
        &self.flags
    }

    /// The mutable flags of the frame.
    pub fn flags_mut(&mut self) -> &mut HeaderFlags {
        &mut self.flags
    }

    /// The stream id of the frame. Negative stream ids are reserved for server-initiated
    /// streams (currently only EVENT, which always carries stream id -1).
    pub fn stream(&self) -> i16 {
        self.stream
    }

    /// Set the stream id of the frame.
    pub fn set_stream(&mut self, stream: i16) {
        self.stream = stream;
    }

    /// The opcode of the frame.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// The length of the body of the frame.
    pub fn body_len(&self) -> u32 {
        self.body_len
    }

    /// Set the length of the body of the frame.
    pub fn set_body_len(&mut self, body_len: u32) {
        self.body_len = body_len;
    }
}

/// The header is always exactly this many bytes.
pub const HEADER_LENGTH: usize = 9;

impl TryFrom<&[u8]> for Header {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        anyhow::ensure!(bytes.len() == HEADER_LENGTH, "invalid header length");
        Ok(Header {
            version: Version(bytes[0]),
            flags: HeaderFlags::from_raw(bytes[1]),
            stream: i16::from_be_bytes([bytes[2], bytes[3]]),
            opcode: bytes[4].try_into()?,
            body_len: u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
        })
    }
}

impl From<Header> for [u8; HEADER_LENGTH] {
    fn from(h: Header) -> Self {
        let stream = h.stream.to_be_bytes();
        [
            h.version.0,
            h.flags.0,
            stream[0],
            stream[1],
            h.opcode as u8,
            (h.body_len >> 24) as u8,
            (h.body_len >> 16) as u8,
            (h.body_len >> 8) as u8,
            h.body_len as u8,
        ]
    }
}
