// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The connection state machine (component D): owns one transport, multiplexes in-flight
//! requests by stream id, and drives the Disconnected/Connected lifecycle of §3/§4.D.
//!
//! Modeled as a single-threaded cooperative actor (§9 Design Notes): a `tokio::task` looping
//! over a `tokio::sync::mpsc` mailbox, a channel-based waiter per request rather than the
//! teacher's `backstage` process-link/monitor scheme.

pub mod options;
pub mod waiter;

pub use options::{ConnectionOptions, ProtocolPreference, ReconfigureFn};
pub use waiter::{WaiterReceiver, WaiterResolution};

use crate::compression::Compressor;
use crate::error::{ConnectionError, Error, ProtocolError};
use crate::frame::{self, Envelope, OpCode, ProtocolVersion};
use crate::protocol::response::{self, Response};
use crate::protocol::request::RequestBody;
use crate::stream::{Exhausted, StreamIdAllocator};
use crate::transport::{self, Transport};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// How long a connection waits after being torn down before it attempts to reconnect.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
/// How often the actor sweeps `in_flight` for waiters whose caller has already gone away.
const CANCELLATION_SWEEP_INTERVAL: Duration = Duration::from_millis(50);
/// How large the read buffer is allowed to grow before a read is attempted again.
const READ_CHUNK: usize = 16 * 1024;

/// Observable lifecycle events (§6).
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { reason: String },
    FailedToConnect { reason: String },
    ServerWarnings(Vec<String>),
}

/// An immutable snapshot handed to a caller by `checkout`. Never shared mutably; the caller
/// owns it for the lifetime of exactly one request (§4.D "Request dispatch").
pub struct DispatchContext {
    pub address: SocketAddr,
    pub protocol: ProtocolVersion,
    pub current_keyspace: Option<String>,
    pub stream_id: u16,
    pub compressor: Option<Arc<dyn Compressor>>,
    write_half: Arc<Mutex<WriteHalf<Transport>>>,
    pub waiter: WaiterReceiver,
}

impl DispatchContext {
    /// Encode `body` under `opcode` against this context and write it to the transport.
    ///
    /// Per §5, this runs without holding the actor's mailbox lock: once a caller holds a
    /// stream id and this snapshot, encoding and the transport write happen independently of
    /// the actor loop. Concurrent writers are serialized by the shared write-half mutex,
    /// which is how this crate satisfies "funnel writes through the actor" on transports that
    /// cannot tolerate concurrent send/recv, while still letting the common case run off the
    /// actor's own task.
    pub async fn send(&self, opcode: OpCode, body: RequestBody) -> Result<(), Error> {
        let encoded = crate::protocol::request::encode_request(&body);
        let frame = frame::encode_frame(
            self.protocol,
            self.stream_id as i16,
            opcode,
            encoded,
            self.compressor.as_deref(),
        )
        .map_err(|e| Error::Protocol(ProtocolError::MalformedFrame(e.to_string())))?;
        let mut write_half = self.write_half.lock().await;
        write_half.write_all(&frame).await?;
        write_half.flush().await?;
        Ok(())
    }
}

enum ActorMessage {
    Checkout { respond_to: oneshot::Sender<Result<DispatchContext, Error>> },
    NotifySetKeyspace(String),
    Shutdown,
}

/// A handle to a running connection actor.
#[derive(Clone)]
pub struct ConnectionHandle {
    mailbox: mpsc::UnboundedSender<ActorMessage>,
}

impl ConnectionHandle {
    /// Acquire a stream id and a dispatch-context snapshot (§4.D "Request dispatch", step 1).
    /// Fails with `NotConnected` while the connection is `Disconnected`, and with the
    /// stream-id allocator's `Exhausted` folded into `Error` if all 32,767 ids are in flight.
    pub async fn checkout(&self) -> Result<DispatchContext, Error> {
        let (tx, rx) = oneshot::channel();
        self.mailbox
            .send(ActorMessage::Checkout { respond_to: tx })
            .map_err(|_| Error::Connection(ConnectionError::ConnectionCrashed("mailbox closed".into())))?;
        rx.await
            .map_err(|_| Error::Connection(ConnectionError::ConnectionCrashed("actor dropped reply".into())))?
    }

    /// Advisory notification that a waiter's response was `SetKeyspace`; the actor does not
    /// validate this, it simply stores it (§4.D "Set-keyspace observation").
    pub fn notify_set_keyspace(&self, keyspace: String) {
        let _ = self.mailbox.send(ActorMessage::NotifySetKeyspace(keyspace));
    }

    /// Request an orderly shutdown of the connection actor.
    pub fn shutdown(&self) {
        let _ = self.mailbox.send(ActorMessage::Shutdown);
    }
}

struct Connected {
    address: SocketAddr,
    write_half: Arc<Mutex<WriteHalf<Transport>>>,
    read_half: ReadHalf<Transport>,
    protocol: ProtocolVersion,
    compressor: Option<Arc<dyn Compressor>>,
    current_keyspace: Option<String>,
    stream_ids: StreamIdAllocator,
    in_flight: HashMap<u16, oneshot::Sender<WaiterResolution>>,
    read_buf: BytesMut,
    event_sink: Option<mpsc::UnboundedSender<Envelope>>,
}

/// Spawn a connection actor. Returns a handle immediately; the actor attempts its first
/// connect asynchronously (§3 Lifecycle: "connection is created Disconnected, attempts
/// connect on an internal tick").
pub fn start(options: ConnectionOptions, events: Option<mpsc::UnboundedSender<ConnectionEvent>>) -> ConnectionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(options, rx, events));
    ConnectionHandle { mailbox: tx }
}

async fn run(
    options: ConnectionOptions,
    mut mailbox: mpsc::UnboundedReceiver<ActorMessage>,
    events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
) {
    let mut state: Option<Connected> = None;
    // `interval` resolves its first `tick()` immediately, so the connection's very first
    // connect attempt happens as soon as the actor loop is polled, with `RECONNECT_INTERVAL`
    // only governing the gap between subsequent attempts.
    let mut reconnect_ticker = interval(RECONNECT_INTERVAL);
    reconnect_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sweep = interval(CANCELLATION_SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    sweep.tick().await; // first tick fires immediately

    let mut read_chunk = vec![0u8; READ_CHUNK];

    loop {
        match &mut state {
            None => {
                tokio::select! {
                    _ = reconnect_ticker.tick() => {
                        match connect_once(&options).await {
                            Ok(connected) => {
                                log::info!("connection to {} established", options.node);
                                emit(&events, ConnectionEvent::Connected);
                                state = Some(connected);
                            }
                            Err(e) => {
                                log::warn!("connect to {} failed: {}", options.node, e);
                                emit(&events, ConnectionEvent::FailedToConnect { reason: e.to_string() });
                            }
                        }
                    }
                    msg = mailbox.recv() => {
                        match msg {
                            None | Some(ActorMessage::Shutdown) => return,
                            Some(ActorMessage::Checkout { respond_to }) => {
                                let _ = respond_to.send(Err(Error::Connection(ConnectionError::NotConnected)));
                            }
                            Some(ActorMessage::NotifySetKeyspace(_)) => {}
                        }
                    }
                }
            }
            Some(connected) => {
                tokio::select! {
                    msg = mailbox.recv() => {
                        match msg {
                            None | Some(ActorMessage::Shutdown) => {
                                let reason = "shutdown requested".to_string();
                                drain(connected, &reason);
                                emit(&events, ConnectionEvent::Disconnected { reason });
                                state = None;
                            }
                            Some(ActorMessage::Checkout { respond_to }) => {
                                let reply = checkout(connected);
                                let _ = respond_to.send(reply);
                            }
                            Some(ActorMessage::NotifySetKeyspace(ks)) => {
                                connected.current_keyspace = Some(ks);
                            }
                        }
                    }
                    n = connected.read_half.read(&mut read_chunk) => {
                        match n {
                            Ok(0) => {
                                let reason = "peer closed the connection".to_string();
                                drain(connected, &reason);
                                emit(&events, ConnectionEvent::Disconnected { reason });
                                state = None;
                            }
                            Ok(n) => {
                                connected.read_buf.extend_from_slice(&read_chunk[..n]);
                                match pump_inbound(connected, &events) {
                                    Ok(()) => {}
                                    Err(e) => {
                                        let reason = e.to_string();
                                        drain(connected, &reason);
                                        emit(&events, ConnectionEvent::Disconnected { reason });
                                        state = None;
                                    }
                                }
                            }
                            Err(e) => {
                                let reason = e.to_string();
                                drain(connected, &reason);
                                emit(&events, ConnectionEvent::Disconnected { reason });
                                state = None;
                            }
                        }
                    }
                    _ = sweep.tick() => {
                        reap_dead_waiters(connected);
                    }
                }
            }
        }
    }
}

fn emit(events: &Option<mpsc::UnboundedSender<ConnectionEvent>>, event: ConnectionEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

fn checkout(connected: &mut Connected) -> Result<DispatchContext, Error> {
    let stream_id = match connected.stream_ids.acquire() {
        Ok(id) => id,
        Err(Exhausted) => {
            return Err(Error::Connection(ConnectionError::ConnectFailed(
                "no free stream ids".into(),
            )))
        }
    };
    let (tx, rx) = waiter::new_waiter();
    connected.in_flight.insert(stream_id, tx);
    Ok(DispatchContext {
        address: connected.address,
        protocol: connected.protocol,
        current_keyspace: connected.current_keyspace.clone(),
        stream_id,
        compressor: connected.compressor.clone(),
        write_half: connected.write_half.clone(),
        waiter: rx,
    })
}

/// Drain every in-flight waiter with a disconnection error and restore full stream-id
/// capacity (§4.D "Connected -> Disconnected").
fn drain(connected: &mut Connected, reason: &str) {
    for (_, waiter) in connected.in_flight.drain() {
        let _ = waiter.send(WaiterResolution::Disconnected(reason.to_string()));
    }
    connected.stream_ids.release_all();
    log::info!("connection disconnected: {}", reason);
}

/// Release the stream id and drop the record for any waiter whose receiver has already gone
/// away (§5 "Cancellation via caller death").
fn reap_dead_waiters(connected: &mut Connected) {
    let dead: Vec<u16> = connected
        .in_flight
        .iter()
        .filter(|(_, waiter)| waiter.is_closed())
        .map(|(id, _)| *id)
        .collect();
    for id in dead {
        connected.in_flight.remove(&id);
        connected.stream_ids.release(id);
    }
}

/// Repeatedly attempt to decode a frame out of the read buffer, routing each to its waiter.
/// Returns `Err(reason)` on an unrecoverable condition (malformed frame, unknown stream id).
fn pump_inbound(
    connected: &mut Connected,
    events: &Option<mpsc::UnboundedSender<ConnectionEvent>>,
) -> Result<(), ProtocolError> {
    loop {
        let decoded = frame::decode_frame(
            connected.read_buf.as_ref(),
            connected.protocol,
            connected.compressor.as_deref(),
        )?;
        let (envelope, consumed) = match decoded {
            Some(pair) => pair,
            None => return Ok(()),
        };
        connected.read_buf.advance(consumed);

        if envelope.header.flags().warning() {
            if let Ok((_, warnings)) = response::decode_response(&envelope) {
                if !warnings.is_empty() {
                    log::warn!("server warnings: {:?}", warnings);
                    emit(events, ConnectionEvent::ServerWarnings(warnings));
                }
            }
        }

        let stream_id = envelope.header.stream();
        if stream_id < 0 {
            match &connected.event_sink {
                Some(sink) => {
                    let _ = sink.send(envelope);
                    continue;
                }
                None => return Err(ProtocolError::UnexpectedStream(stream_id as u16)),
            }
        }
        let stream_id = stream_id as u16;
        match connected.in_flight.remove(&stream_id) {
            Some(waiter) => {
                connected.stream_ids.release(stream_id);
                let _ = waiter.send(WaiterResolution::Frame(envelope));
            }
            None => return Err(ProtocolError::UnexpectedStream(stream_id)),
        }
    }
}

/// Run the STARTUP handshake of §4.D and return the resulting `Connected` actor state.
async fn connect_once(options: &ConnectionOptions) -> Result<Connected, Error> {
    let resolved = options.resolve();
    let transport = if resolved.encryption {
        #[cfg(feature = "tls")]
        {
            let config = resolved.tls_config.clone().ok_or_else(|| {
                Error::Connection(ConnectionError::ConnectFailed(
                    "encryption requested but no tls_config was supplied".into(),
                ))
            })?;
            let server_name = resolved
                .tls_server_name
                .clone()
                .unwrap_or_else(|| resolved.node.ip().to_string());
            transport::tls::connect_tls(resolved.node, &server_name, config).await?
        }
        #[cfg(not(feature = "tls"))]
        {
            return Err(Error::Connection(ConnectionError::ConnectFailed(
                "encryption requested but this build has no TLS backend enabled".into(),
            )));
        }
    } else {
        Transport::connect_tcp(resolved.node).await?
    };
    let (read_half, write_half) = tokio::io::split(transport);
    let write_half = Arc::new(Mutex::new(write_half));
    let mut read_half = read_half;
    let mut read_buf = BytesMut::new();

    let mut protocol = match resolved.protocol_version {
        ProtocolPreference::V3 => ProtocolVersion::V3,
        ProtocolPreference::V4 => ProtocolVersion::V4,
        ProtocolPreference::V5 => ProtocolVersion::V5,
        ProtocolPreference::Auto => ProtocolVersion::V4,
    };

    loop {
        let options_envelope = handshake_round_trip(
            &mut read_half,
            &write_half,
            protocol,
            None,
            OpCode::Options,
            RequestBody::Options,
            &mut read_buf,
        )
        .await?;
        let (options_response, _) = response::decode_response(&options_envelope)
            .map_err(|e| Error::Protocol(ProtocolError::MalformedFrame(e.to_string())))?;
        let supported = match options_response {
            Response::Supported { options } => options,
            _ => return Err(Error::Connection(ConnectionError::ConnectFailed("expected SUPPORTED".into()))),
        };

        let compressor: Option<Arc<dyn Compressor>> = match resolved.compressor {
            Some(kind) => {
                let compressor = kind.compressor();
                let server_algorithms = supported.get("COMPRESSION").cloned().unwrap_or_default();
                if !server_algorithms.iter().any(|a| a == compressor.algorithm()) {
                    return Err(Error::Protocol(ProtocolError::UnsupportedCompression(
                        compressor.algorithm().to_string(),
                    )));
                }
                Some(Arc::from(compressor))
            }
            None => None,
        };

        let cql_version = supported
            .get("CQL_VERSION")
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_else(|| "3.0.0".to_string());

        let startup = RequestBody::Startup {
            cql_version,
            compression: compressor.as_ref().map(|c| c.algorithm().to_string()),
        };
        let startup_envelope = handshake_round_trip(
            &mut read_half,
            &write_half,
            protocol,
            None,
            OpCode::Startup,
            startup,
            &mut read_buf,
        )
        .await?;
        let (startup_response, _) = response::decode_response(&startup_envelope)
            .map_err(|e| Error::Protocol(ProtocolError::MalformedFrame(e.to_string())))?;

        match startup_response {
            Response::Ready => {
                let mut current_keyspace = None;
                if let Some(keyspace) = &resolved.keyspace {
                    let use_body = RequestBody::Query {
                        statement: format!("USE {}", keyspace),
                        params: Default::default(),
                    };
                    let use_envelope = handshake_round_trip(
                        &mut read_half,
                        &write_half,
                        protocol,
                        compressor.as_deref(),
                        OpCode::Query,
                        use_body,
                        &mut read_buf,
                    )
                    .await?;
                    let (use_response, _) = response::decode_response(&use_envelope)
                        .map_err(|e| Error::Protocol(ProtocolError::MalformedFrame(e.to_string())))?;
                    if let Response::Result(crate::protocol::response::ResultBody::SetKeyspace(ks)) = use_response {
                        current_keyspace = Some(ks);
                    }
                }
                return Ok(Connected {
                    address: resolved.node,
                    write_half,
                    read_half,
                    protocol,
                    compressor,
                    current_keyspace,
                    stream_ids: StreamIdAllocator::default(),
                    in_flight: HashMap::new(),
                    read_buf,
                    event_sink: resolved.event_sink.clone(),
                });
            }
            Response::Authenticate { authenticator } => {
                return Err(Error::Connection(ConnectionError::ConnectFailed(format!(
                    "server requires authentication ({}); authentication handshake is outside this core",
                    authenticator
                ))));
            }
            Response::Error { code, message, extra } => {
                if let Some(offered) = parse_protocol_downgrade(&extra) {
                    if let Ok(next) = ProtocolVersion::from_raw(offered) {
                        if next < protocol {
                            log::warn!("server requested protocol downgrade to v{:?}", next);
                            protocol = next;
                            continue;
                        }
                    }
                    return Err(Error::Protocol(ProtocolError::ProtocolNegotiationFailed));
                }
                return Err(Error::Connection(ConnectionError::ConnectFailed(format!(
                    "{:?}: {}",
                    code, message
                ))));
            }
            _ => {
                return Err(Error::Connection(ConnectionError::ConnectFailed(
                    "unexpected response to STARTUP".into(),
                )))
            }
        }
    }
}

/// A best-effort decode of the non-standard `{use_this_protocol_instead, wanted, offered}`
/// trailing fields some servers attach to a protocol-error ERROR body during downgrade
/// negotiation (§4.D step 7, §9 Open Question: treated as `ConnectFailed` when absent/
/// unparsable rather than guessed at further).
fn parse_protocol_downgrade(extra: &[u8]) -> Option<u8> {
    // layout: [use_this_protocol_instead: u8][wanted: u8][offered: u8]
    extra.get(2).copied()
}

/// Write one request and block (within the handshake only -- no multiplexing is active yet)
/// until a full response envelope has been read back.
async fn handshake_round_trip(
    read_half: &mut ReadHalf<Transport>,
    write_half: &Arc<Mutex<WriteHalf<Transport>>>,
    protocol: ProtocolVersion,
    compressor: Option<&dyn Compressor>,
    opcode: OpCode,
    body: RequestBody,
    read_buf: &mut BytesMut,
) -> Result<Envelope, Error> {
    let encoded = crate::protocol::request::encode_request(&body);
    let frame = frame::encode_frame(protocol, 0, opcode, encoded, compressor)
        .map_err(|e| Error::Protocol(ProtocolError::MalformedFrame(e.to_string())))?;
    {
        let mut write_half = write_half.lock().await;
        write_half.write_all(&frame).await?;
        write_half.flush().await?;
    }
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some((envelope, consumed)) =
            frame::decode_frame(read_buf.as_ref(), protocol, compressor).map_err(Error::Protocol)?
        {
            read_buf.advance(consumed);
            return Ok(envelope);
        }
        let n = read_half.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Connection(ConnectionError::ConnectFailed(
                "connection closed during handshake".into(),
            )));
        }
        read_buf.extend_from_slice(&chunk[..n]);
    }
}
