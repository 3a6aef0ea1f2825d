// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The stream-id allocator (component C): 1..=32767 ids, at most one in flight at a time.

use std::collections::BTreeSet;

/// The highest stream id a connection may hand out. Native protocol streams are a signed
/// 16-bit quantity; negative ids are reserved for server-initiated pushes (EVENT uses -1),
/// so the client side gets 1..=32767 (id 0 is reserved for synchronous requests like USE,
/// and 32768 itself has no positive `i16` representation so is never allocated).
pub const MAX_STREAM_ID: u16 = 32_767;

/// The connection has no free stream id left; all 32,767 are in flight.
#[derive(Debug, Eq, PartialEq)]
pub struct Exhausted;

/// Holds the set of free stream ids and hands them out/takes them back.
///
/// Tests can seed a non-default free set via [`StreamIdAllocator::with_free_ids`] to force a
/// specific id to be the next one acquired.
#[derive(Debug)]
pub struct StreamIdAllocator {
    free: BTreeSet<u16>,
}

impl Default for StreamIdAllocator {
    fn default() -> Self {
        Self {
            free: (1..=MAX_STREAM_ID).collect(),
        }
    }
}

impl StreamIdAllocator {
    /// Construct an allocator with an explicit free set (for deterministic tests).
    pub fn with_free_ids(free: impl IntoIterator<Item = u16>) -> Self {
        Self { free: free.into_iter().collect() }
    }

    /// Acquire the lowest free stream id, or `Exhausted` if none remain.
    pub fn acquire(&mut self) -> Result<u16, Exhausted> {
        let id = *self.free.iter().next().ok_or(Exhausted)?;
        self.free.remove(&id);
        Ok(id)
    }

    /// Return a stream id to the free set. Panics if `id` is already free (double release
    /// would violate the "at most one in flight per id" invariant and indicates a bug at the
    /// call site, not a recoverable runtime condition).
    pub fn release(&mut self, id: u16) {
        let inserted = self.free.insert(id);
        debug_assert!(inserted, "stream id {} released twice", id);
    }

    /// Return every id to the free set (drain-on-disconnect, §4.D).
    pub fn release_all(&mut self) {
        self.free = (1..=MAX_STREAM_ID).collect();
    }

    /// Number of free ids remaining.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Whether every id 1..=32767 is currently free.
    pub fn is_full(&self) -> bool {
        self.free.len() == MAX_STREAM_ID as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full() {
        let allocator = StreamIdAllocator::default();
        assert!(allocator.is_full());
        assert_eq!(allocator.free_count(), MAX_STREAM_ID as usize);
    }

    #[test]
    fn acquire_release_round_trips() {
        let mut allocator = StreamIdAllocator::default();
        let id = allocator.acquire().unwrap();
        assert_eq!(allocator.free_count(), MAX_STREAM_ID as usize - 1);
        allocator.release(id);
        assert!(allocator.is_full());
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut allocator = StreamIdAllocator::with_free_ids([1]);
        assert_eq!(allocator.acquire(), Ok(1));
        assert_eq!(allocator.acquire(), Err(Exhausted));
    }

    #[test]
    fn release_all_restores_full_capacity() {
        let mut allocator = StreamIdAllocator::default();
        let ids: Vec<_> = (0..100).map(|_| allocator.acquire().unwrap()).collect();
        assert_eq!(ids.len(), 100);
        allocator.release_all();
        assert!(allocator.is_full());
    }

    #[test]
    fn forced_id_via_dependency_injection() {
        let mut allocator = StreamIdAllocator::with_free_ids([5]);
        assert_eq!(allocator.acquire(), Ok(5));
    }

    #[test]
    fn no_two_acquires_observe_the_same_id() {
        let mut allocator = StreamIdAllocator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..MAX_STREAM_ID {
            let id = allocator.acquire().unwrap();
            assert!(seen.insert(id), "stream id {} handed out twice", id);
        }
        assert_eq!(allocator.acquire(), Err(Exhausted));
    }
}
