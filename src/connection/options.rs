// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Connection start options (§6 `start(options)`).

use crate::compression::CompressionType;
use crate::frame::Envelope;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which protocol generation to speak, or let the connection negotiate one starting from the
/// highest it knows (§4.D step 7, protocol downgrade).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProtocolPreference {
    V3,
    V4,
    V5,
    /// Start at the highest supported version and downgrade on negotiation failure.
    Auto,
}

/// A user-supplied hook that can rewrite [`ConnectionOptions`] on each connect attempt,
/// abstracted as a single polymorphic capability (§9 Design Notes) rather than the
/// `{module, function, args}` shape of the original.
pub type ReconfigureFn = Arc<dyn Fn(ConnectionOptions) -> ConnectionOptions + Send + Sync>;

/// Options accepted by `start` (§6).
#[derive(Clone)]
pub struct ConnectionOptions {
    /// The contact point this connection dials.
    pub node: SocketAddr,
    /// Whether to negotiate TLS (requires the `tls` feature to actually establish one).
    pub encryption: bool,
    /// Which protocol generation(s) to accept.
    pub protocol_version: ProtocolPreference,
    /// The compression algorithm to request at STARTUP, if any.
    pub compressor: Option<CompressionType>,
    /// `USE <keyspace>` sent synchronously right after STARTUP, if set.
    pub keyspace: Option<String>,
    /// Advisory default consistency level passed through to callers; the core itself does not
    /// interpret consistency-level semantics (§1 Non-goals).
    pub default_consistency: u16,
    /// Reconfigure hook invoked against the original options before every connect attempt.
    pub configure: Option<ReconfigureFn>,
    /// An optional identity for this connection, surfaced in logs/events only.
    pub name: Option<String>,
    /// TLS client configuration, consulted only when `encryption` is set and the `tls`
    /// feature is enabled.
    #[cfg(feature = "tls")]
    pub tls_config: Option<Arc<tokio_rustls::rustls::ClientConfig>>,
    /// The server name certificate verification is performed against when `encryption` is
    /// set. Defaults to `node`'s IP address if unset.
    pub tls_server_name: Option<String>,
    /// Where server-pushed EVENT frames (stream id -1) are forwarded once this connection has
    /// sent a REGISTER. Connections that never REGISTER can leave this `None`; an EVENT arriving
    /// with no sink configured is treated as a protocol violation (§4.D inbound routing).
    pub event_sink: Option<mpsc::UnboundedSender<Envelope>>,
}

impl ConnectionOptions {
    /// Construct options for a plain, unauthenticated connection to `node`.
    pub fn new(node: SocketAddr) -> Self {
        Self {
            node,
            encryption: false,
            protocol_version: ProtocolPreference::Auto,
            compressor: None,
            keyspace: None,
            default_consistency: 1,
            configure: None,
            name: None,
            #[cfg(feature = "tls")]
            tls_config: None,
            tls_server_name: None,
            event_sink: None,
        }
    }

    /// Apply the reconfigure hook, if any, yielding the options to actually connect with.
    pub fn resolve(&self) -> ConnectionOptions {
        match &self.configure {
            Some(f) => f(self.clone()),
            None => self.clone(),
        }
    }
}
