// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Pure host-membership bookkeeping for the control connection: the `HostInfo` record a row
//! decoder produces, and the diffing logic that turns two snapshots into topology events.
//! Deliberately free of any I/O so it can be exercised without a connection.

use std::collections::HashMap;
use std::net::IpAddr;

/// A host's identity: its RPC address together with the native-protocol port it listens on
/// (§3 `Host`: `identity = (address, port)`).
pub type HostId = (IpAddr, u16);

/// What this core knows about one cluster member, decoded from a `system.local`/
/// `system.peers` row by an external collaborator (§1 scope: CQL value decoding is not this
/// crate's concern; callers supply a [`super::PeerRowDecoder`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostInfo {
    pub rpc_address: IpAddr,
    pub port: u16,
    pub datacenter: Option<String>,
    pub rack: Option<String>,
    pub tokens: Vec<String>,
}

impl HostInfo {
    /// This host's identity, as used to key a [`HostMap`].
    pub fn id(&self) -> HostId {
        (self.rpc_address, self.port)
    }
}

/// A membership or liveness change derived by comparing two topology snapshots, or observed
/// directly from a STATUS_CHANGE/TOPOLOGY_CHANGE push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyEvent {
    HostAdded(HostId),
    HostRemoved(HostId),
    HostUp(HostId),
    HostDown(HostId),
}

/// The set of hosts known at one point in time, keyed by `(address, port)` identity.
pub type HostMap = HashMap<HostId, HostInfo>;

/// Diff two host snapshots into `HostAdded`/`HostRemoved` events. Comparing a snapshot against
/// itself always yields an empty vector: repeated refreshes with no actual membership change
/// never re-announce anything (§4.E "idempotent re-announcement suppression").
pub fn diff_membership(previous: &HostMap, current: &HostMap) -> Vec<TopologyEvent> {
    let mut events: Vec<TopologyEvent> = current
        .keys()
        .filter(|id| !previous.contains_key(*id))
        .map(|id| TopologyEvent::HostAdded(*id))
        .collect();
    events.extend(
        previous
            .keys()
            .filter(|id| !current.contains_key(*id))
            .map(|id| TopologyEvent::HostRemoved(*id)),
    );
    events
}

/// Tracks per-host up/down state so that a repeated STATUS_CHANGE for an already-observed
/// state is suppressed rather than re-emitted (§4.E).
#[derive(Default)]
pub struct LivenessTracker {
    up: HashMap<HostId, bool>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed liveness status, returning the event to emit only if it actually
    /// changes this host's previously known state.
    pub fn observe(&mut self, id: HostId, is_up: bool) -> Option<TopologyEvent> {
        match self.up.insert(id, is_up) {
            Some(previous) if previous == is_up => None,
            _ => Some(if is_up { TopologyEvent::HostUp(id) } else { TopologyEvent::HostDown(id) }),
        }
    }

    /// Drop any tracked state for a host that has left the cluster entirely.
    pub fn forget(&mut self, id: HostId) {
        self.up.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(addr: &str, port: u16) -> (HostId, HostInfo) {
        let ip: IpAddr = addr.parse().unwrap();
        let info = HostInfo { rpc_address: ip, port, datacenter: None, rack: None, tokens: vec![] };
        (info.id(), info)
    }

    #[test]
    fn diff_against_self_is_empty() {
        let map: HostMap = [host("10.0.0.1", 9042), host("10.0.0.2", 9042)].into_iter().collect();
        assert!(diff_membership(&map, &map).is_empty());
    }

    #[test]
    fn new_host_is_added() {
        let previous: HostMap = [host("10.0.0.1", 9042)].into_iter().collect();
        let current: HostMap = [host("10.0.0.1", 9042), host("10.0.0.2", 9042)].into_iter().collect();
        let events = diff_membership(&previous, &current);
        assert_eq!(events, vec![TopologyEvent::HostAdded(("10.0.0.2".parse().unwrap(), 9042))]);
    }

    #[test]
    fn missing_host_is_removed() {
        let previous: HostMap = [host("10.0.0.1", 9042), host("10.0.0.2", 9042)].into_iter().collect();
        let current: HostMap = [host("10.0.0.1", 9042)].into_iter().collect();
        let events = diff_membership(&previous, &current);
        assert_eq!(events, vec![TopologyEvent::HostRemoved(("10.0.0.2".parse().unwrap(), 9042))]);
    }

    #[test]
    fn repeated_status_is_suppressed() {
        let mut tracker = LivenessTracker::new();
        let id: HostId = ("10.0.0.1".parse().unwrap(), 9042);
        assert_eq!(tracker.observe(id, true), Some(TopologyEvent::HostUp(id)));
        assert_eq!(tracker.observe(id, true), None);
        assert_eq!(tracker.observe(id, false), Some(TopologyEvent::HostDown(id)));
        assert_eq!(tracker.observe(id, false), None);
    }
}
