// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The waiter handle: a one-shot reply channel uniquely tied to one stream id for the
//! lifetime of one request (§3 "Waiter handle").

use crate::frame::Envelope;
use tokio::sync::oneshot;

/// What a waiter is eventually resolved with.
#[derive(Debug)]
pub enum WaiterResolution {
    /// The frame that arrived for this stream id.
    Frame(Envelope),
    /// The connection was torn down before a response arrived.
    Disconnected(String),
}

/// The actor-side half of a waiter: sent into exactly once, either by an inbound frame
/// matching its stream id or by connection teardown.
pub type WaiterSender = oneshot::Sender<WaiterResolution>;

/// The caller-side half: awaited with the caller's own timeout (§5 Cancellation & timeouts).
pub type WaiterReceiver = oneshot::Receiver<WaiterResolution>;

/// Create a fresh waiter pair.
pub fn new_waiter() -> (WaiterSender, WaiterReceiver) {
    oneshot::channel()
}
