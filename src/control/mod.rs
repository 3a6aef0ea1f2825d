// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The control connection / topology supervisor (component E): a dedicated connection that
//! discovers peers from `system.local`/`system.peers`, stays REGISTERed for STATUS_CHANGE and
//! TOPOLOGY_CHANGE pushes, and periodically refreshes the host map even with no pushes at all.

pub mod topology;

pub use topology::{HostId, HostInfo, HostMap, TopologyEvent};

use crate::connection::{self, ConnectionEvent, ConnectionHandle, ConnectionOptions, WaiterResolution};
use crate::error::{ConnectionError, Error, ProtocolError};
use crate::frame::{Envelope, OpCode};
use crate::protocol::request::{QueryParams, RequestBody};
use crate::protocol::response::{self, EventBody, Response, ResultBody};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// How often the control connection re-queries `system.local`/`system.peers` even with no
/// intervening push events.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);
/// Delay before acting on a NEW_NODE/REMOVED_NODE push, giving gossip time to propagate to the
/// rest of the ring before this driver trusts it.
pub const NEW_NODE_DELAY: Duration = Duration::from_secs(5);
/// How long to wait between attempts across the whole contact-point list when every one fails.
const CONTACT_POINT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Decodes CQL rows from `system.local`/`system.peers` into [`HostInfo`] records. Column value
/// decoding is an external collaborator (§1 scope); this crate only owns getting the raw rows
/// off the wire and reacting to the resulting host map.
pub trait PeerRowDecoder: Send + Sync {
    fn decode_local(&self, rows: &[u8]) -> anyhow::Result<HostInfo>;
    fn decode_peers(&self, rows: &[u8]) -> anyhow::Result<Vec<HostInfo>>;
}

/// Options accepted by [`start`].
pub struct ControlOptions {
    /// Tried in order on every (re)connect attempt; the first to succeed becomes the control
    /// connection until it's lost.
    pub contact_points: Vec<ConnectionOptions>,
    pub row_decoder: Arc<dyn PeerRowDecoder>,
    pub refresh_interval: Duration,
}

/// Events surfaced to the embedding application.
#[derive(Debug)]
pub enum SupervisorEvent {
    Topology(TopologyEvent),
    ControlConnectionLost { reason: String },
}

/// A handle to a running control-connection supervisor.
pub struct ControlHandle {
    shutdown: mpsc::UnboundedSender<()>,
}

impl ControlHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Spawn the control-connection supervisor.
pub fn start(options: ControlOptions, events: mpsc::UnboundedSender<SupervisorEvent>) -> ControlHandle {
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(options, events, shutdown_rx));
    ControlHandle { shutdown: shutdown_tx }
}

async fn run(
    options: ControlOptions,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    mut shutdown: mpsc::UnboundedReceiver<()>,
) {
    let mut hosts: HostMap = HostMap::new();
    let mut liveness = topology::LivenessTracker::new();

    'reconnect: loop {
        let (handle, mut connection_events, mut push_rx) = match connect_any(&options.contact_points).await {
            Some(triple) => triple,
            None => {
                log::warn!(
                    "control connection: no contact point reachable, retrying in {:?}",
                    CONTACT_POINT_RETRY_DELAY
                );
                tokio::select! {
                    _ = sleep(CONTACT_POINT_RETRY_DELAY) => continue 'reconnect,
                    _ = shutdown.recv() => return,
                }
            }
        };

        if let Err(e) = register_for_events(&handle).await {
            log::warn!("control connection: REGISTER failed: {}", e);
            handle.shutdown();
            continue 'reconnect;
        }

        if let Err(e) = refresh_and_diff(&handle, &options.row_decoder, &mut hosts, &events).await {
            log::warn!("control connection: initial topology refresh failed: {}", e);
            handle.shutdown();
            continue 'reconnect;
        }

        let mut refresh_ticker = interval(options.refresh_interval);
        refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        refresh_ticker.tick().await;

        let (delayed_tx, mut delayed_rx) = mpsc::unbounded_channel::<()>();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    handle.shutdown();
                    return;
                }
                msg = connection_events.recv() => {
                    match msg {
                        Some(ConnectionEvent::Disconnected { reason }) | Some(ConnectionEvent::FailedToConnect { reason }) => {
                            let _ = events.send(SupervisorEvent::ControlConnectionLost { reason });
                            continue 'reconnect;
                        }
                        None => {
                            let _ = events.send(SupervisorEvent::ControlConnectionLost { reason: "connection actor gone".into() });
                            continue 'reconnect;
                        }
                        _ => {}
                    }
                }
                _ = refresh_ticker.tick() => {
                    if let Err(e) = refresh_and_diff(&handle, &options.row_decoder, &mut hosts, &events).await {
                        log::warn!("control connection: periodic refresh failed: {}", e);
                        let _ = events.send(SupervisorEvent::ControlConnectionLost { reason: e.to_string() });
                        handle.shutdown();
                        continue 'reconnect;
                    }
                }
                _ = delayed_rx.recv() => {
                    if let Err(e) = refresh_and_diff(&handle, &options.row_decoder, &mut hosts, &events).await {
                        log::warn!("control connection: delayed topology refresh failed: {}", e);
                        let _ = events.send(SupervisorEvent::ControlConnectionLost { reason: e.to_string() });
                        handle.shutdown();
                        continue 'reconnect;
                    }
                }
                push = push_rx.recv() => {
                    match push {
                        None => {
                            let _ = events.send(SupervisorEvent::ControlConnectionLost { reason: "push channel closed".into() });
                            continue 'reconnect;
                        }
                        Some(envelope) => handle_push(envelope, &mut liveness, &delayed_tx, &events),
                    }
                }
            }
        }
    }
}

/// Try each contact point in order until one completes its handshake. Returns the connection
/// handle plus its lifecycle-event and EVENT-push receivers.
async fn connect_any(
    contact_points: &[ConnectionOptions],
) -> Option<(ConnectionHandle, mpsc::UnboundedReceiver<ConnectionEvent>, mpsc::UnboundedReceiver<Envelope>)> {
    for base in contact_points {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut opts = base.clone();
        opts.event_sink = Some(push_tx);
        let handle = connection::start(opts, Some(event_tx));
        match event_rx.recv().await {
            Some(ConnectionEvent::Connected) => return Some((handle, event_rx, push_rx)),
            _ => {
                handle.shutdown();
                continue;
            }
        }
    }
    None
}

async fn register_for_events(handle: &ConnectionHandle) -> Result<(), Error> {
    let ctx = handle.checkout().await?;
    let body = RequestBody::Register {
        event_types: vec!["STATUS_CHANGE".to_string(), "TOPOLOGY_CHANGE".to_string()],
    };
    ctx.send(OpCode::Register, body).await?;
    match ctx.waiter.await {
        Ok(WaiterResolution::Frame(envelope)) => {
            let (decoded, _) =
                response::decode_response(&envelope).map_err(|e| Error::Protocol(ProtocolError::MalformedFrame(e.to_string())))?;
            match decoded {
                Response::Ready => Ok(()),
                other => Err(Error::Connection(ConnectionError::ConnectFailed(format!(
                    "unexpected REGISTER response: {:?}",
                    other
                )))),
            }
        }
        Ok(WaiterResolution::Disconnected(reason)) => Err(Error::Connection(ConnectionError::Disconnected(reason))),
        Err(_) => Err(Error::Connection(ConnectionError::ConnectionCrashed("waiter dropped".into()))),
    }
}

async fn query_rows(handle: &ConnectionHandle, cql: &str) -> Result<Option<Vec<u8>>, Error> {
    let ctx = handle.checkout().await?;
    let body = RequestBody::Query {
        statement: cql.to_string(),
        params: QueryParams::default(),
    };
    ctx.send(OpCode::Query, body).await?;
    match ctx.waiter.await {
        Ok(WaiterResolution::Frame(envelope)) => {
            let (decoded, _) =
                response::decode_response(&envelope).map_err(|e| Error::Protocol(ProtocolError::MalformedFrame(e.to_string())))?;
            match decoded {
                Response::Result(ResultBody::Rows { rows, .. }) => Ok(Some(rows)),
                _ => Ok(None),
            }
        }
        Ok(WaiterResolution::Disconnected(reason)) => Err(Error::Connection(ConnectionError::Disconnected(reason))),
        Err(_) => Err(Error::Connection(ConnectionError::ConnectionCrashed("waiter dropped".into()))),
    }
}

async fn refresh_and_diff(
    handle: &ConnectionHandle,
    decoder: &Arc<dyn PeerRowDecoder>,
    hosts: &mut HostMap,
    events: &mpsc::UnboundedSender<SupervisorEvent>,
) -> Result<(), Error> {
    let local_rows = query_rows(handle, "SELECT * FROM system.local").await?;
    let peer_rows = query_rows(handle, "SELECT * FROM system.peers").await?;

    let mut fresh = HostMap::new();
    if let Some(rows) = local_rows {
        if let Ok(host) = decoder.decode_local(&rows) {
            fresh.insert(host.id(), host);
        }
    }
    if let Some(rows) = peer_rows {
        if let Ok(peers) = decoder.decode_peers(&rows) {
            for host in peers {
                fresh.insert(host.id(), host);
            }
        }
    }

    let diff = topology::diff_membership(hosts, &fresh);
    *hosts = fresh;
    for event in diff {
        let _ = events.send(SupervisorEvent::Topology(event));
    }
    Ok(())
}

fn handle_push(
    envelope: Envelope,
    liveness: &mut topology::LivenessTracker,
    delayed_refresh: &mpsc::UnboundedSender<()>,
    events: &mpsc::UnboundedSender<SupervisorEvent>,
) {
    let (decoded, _) = match response::decode_response(&envelope) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("control connection: malformed push event: {}", e);
            return;
        }
    };
    let event_body = match decoded {
        Response::Event(body) => body,
        other => {
            log::warn!("control connection: unexpected push frame {:?}", other);
            return;
        }
    };
    match event_body {
        EventBody::StatusChange { status, address, port } => {
            let addr: IpAddr = match address.parse() {
                Ok(addr) => addr,
                Err(_) => return,
            };
            let is_up = status.eq_ignore_ascii_case("UP");
            if let Some(event) = liveness.observe((addr, port), is_up) {
                let _ = events.send(SupervisorEvent::Topology(event));
            }
        }
        EventBody::TopologyChange { change_type, .. } => match change_type.as_str() {
            "NEW_NODE" | "REMOVED_NODE" => {
                let delayed_refresh = delayed_refresh.clone();
                tokio::spawn(async move {
                    sleep(NEW_NODE_DELAY).await;
                    let _ = delayed_refresh.send(());
                });
            }
            "MOVED_NODE" => {
                log::warn!("control connection: ignoring MOVED_NODE, token ownership changes are out of scope");
            }
            other => log::warn!("control connection: unknown TOPOLOGY_CHANGE type {}", other),
        },
        EventBody::SchemaChange { .. } => {}
    }
}
