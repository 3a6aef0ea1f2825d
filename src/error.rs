// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The typed error hierarchy surfaced by the core to its embedding.

use crate::protocol::response::ErrorCodes;
use thiserror::Error;

/// Top level error returned by connection and control-connection operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Errors arising from the lifecycle of the transport connection itself.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Errors arising while encoding or decoding the wire protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A fatal mismatch between the connection's bound compressor and one requested per-query.
    #[error("compressor mismatch: connection is bound to {conn:?}, query requested {query:?}")]
    CompressorMismatch {
        /// The compressor (if any) the connection negotiated at STARTUP.
        conn: Option<String>,
        /// The compressor (if any) requested for this query.
        query: Option<String>,
    },
    /// The server responded with an ERROR frame.
    #[error("server error {code:?}: {message}")]
    ServerError {
        /// The numeric/typed error code from the ERROR body.
        code: ErrorCodes,
        /// The human readable message that accompanied it.
        message: String,
    },
}

/// Errors relating to the connection lifecycle (§7 `Connection`).
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// A request was issued while the connection was not `Connected`.
    #[error("not connected")]
    NotConnected,
    /// The connect attempt (TCP/TLS/handshake) failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// The connection was torn down; carries the reason it was torn down for.
    #[error("disconnected: {0}")]
    Disconnected(String),
    /// The caller's timeout elapsed before a response arrived.
    #[error("timeout waiting for response")]
    Timeout,
    /// The connection actor itself crashed (mailbox dropped, task panicked).
    #[error("connection actor crashed: {0}")]
    ConnectionCrashed(String),
}

/// Errors relating to decoding/encoding the wire protocol (§7 `Protocol`).
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame could not be parsed; `cause` carries the underlying reason.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// A v5 segment header failed its CRC24 check.
    #[error("v5 segment header failed CRC24 check")]
    CrcHeader,
    /// A v5 segment payload failed its CRC32 check.
    #[error("v5 segment payload failed CRC32 check")]
    CrcPayload,
    /// A compressor was configured whose algorithm the server does not support.
    #[error("server does not support compression algorithm {0:?}")]
    UnsupportedCompression(String),
    /// A protocol version was requested that this crate cannot speak.
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocol(u8),
    /// Protocol downgrade negotiation exhausted every version this crate supports.
    #[error("protocol negotiation failed")]
    ProtocolNegotiationFailed,
    /// A response frame arrived for a stream id with no registered waiter.
    #[error("response for unknown stream id {0}")]
    UnexpectedStream(u16),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Connection(ConnectionError::ConnectFailed(e.to_string()))
    }
}
