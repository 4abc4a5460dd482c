//! Per-client sequence continuity tracking.
//!
//! Each sensor node numbers its frames. The tracker remembers the last
//! accepted sequence per client address and reports a [`SequenceGap`] when the
//! next accepted frame does not follow on directly. It is observational only:
//! frames are never dropped or reordered because of a gap.
//!
//! ```text
//! SequenceTracker
//!     ├── entries: HashMap<IpAddr, Entry>      // last sequence + recency stamp
//!     ├── order:   VecDeque<(IpAddr, u64)>     // recency queue, oldest first
//!     └── capacity                             // max tracked clients
//! ```
//!
//! The map is bounded. When a new client would exceed `capacity`, the least
//! recently seen client is forgotten; its next frame starts a fresh entry
//! without a gap check.
//!
//! Touching an existing client pushes a new stamp instead of moving the old
//! one, so the queue may hold stale stamps. Eviction skips any queue item whose
//! stamp no longer matches the entry, and the queue is compacted once it grows
//! past twice the capacity.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

/// Default number of clients remembered before LRU eviction starts.
pub const DEFAULT_MAX_TRACKED_CLIENTS: usize = 4096;

/// A discontinuity between the expected and received sequence number.
///
/// `expected` is one past the last accepted sequence, computed without
/// wrapping, so a counter that rolls over from `u32::MAX` to 0 shows up as a
/// large negative `lost`. `lost` is `received - expected` and also goes
/// negative for duplicates and out-of-order delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub expected: i64,
    pub received: u32,
    pub lost: i64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_seq: u32,
    stamp: u64,
}

#[derive(Debug)]
pub struct SequenceTracker {
    entries: HashMap<IpAddr, Entry>,
    order: VecDeque<(IpAddr, u64)>,
    capacity: usize,
    clock: u64,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_TRACKED_CLIENTS)
    }
}

impl SequenceTracker {
    /// Tracker that remembers at most `capacity` clients (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            clock: 0,
        }
    }

    /// Record `sequence` as the latest accepted frame from `client`.
    ///
    /// Returns a gap when an entry existed and `sequence` is not its
    /// successor. The entry is overwritten either way.
    pub fn observe(&mut self, client: IpAddr, sequence: u32) -> Option<SequenceGap> {
        self.clock += 1;
        let stamp = self.clock;

        let gap = match self.entries.get_mut(&client) {
            Some(entry) => {
                let expected = i64::from(entry.last_seq) + 1;
                entry.last_seq = sequence;
                entry.stamp = stamp;
                (i64::from(sequence) != expected).then(|| SequenceGap {
                    expected,
                    received: sequence,
                    lost: i64::from(sequence) - expected,
                })
            }
            None => {
                self.entries.insert(
                    client,
                    Entry {
                        last_seq: sequence,
                        stamp,
                    },
                );
                None
            }
        };
        self.order.push_back((client, stamp));

        self.evict_over_capacity();
        if self.order.len() > self.capacity.saturating_mul(2) {
            self.compact();
        }
        gap
    }

    /// Last accepted sequence for `client`, if it is still tracked.
    pub fn last_seen(&self, client: &IpAddr) -> Option<u32> {
        self.entries.get(client).map(|e| e.last_seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_over_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            let Some((client, stamp)) = self.order.pop_front() else {
                break;
            };
            let current = self.entries.get(&client).map(|e| e.stamp);
            if current == Some(stamp) {
                self.entries.remove(&client);
                log::debug!("Sequence tracker full; forgetting {}", client);
            }
        }
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(client, stamp)| entries.get(client).map(|e| e.stamp) == Some(*stamp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn first_frame_never_reports_a_gap() {
        let mut t = SequenceTracker::default();
        assert_eq!(t.observe(ip(1), 1000), None);
        assert_eq!(t.last_seen(&ip(1)), Some(1000));
    }

    #[test]
    fn contiguous_sequence_has_no_gap() {
        let mut t = SequenceTracker::default();
        t.observe(ip(1), 5);
        assert_eq!(t.observe(ip(1), 6), None);
    }

    #[test]
    fn skipped_sequence_reports_loss() {
        let mut t = SequenceTracker::default();
        t.observe(ip(1), 5);
        assert_eq!(
            t.observe(ip(1), 7),
            Some(SequenceGap {
                expected: 6,
                received: 7,
                lost: 1
            })
        );
        assert_eq!(t.last_seen(&ip(1)), Some(7));
    }

    #[test]
    fn duplicate_and_reordered_frames_report_negative_loss() {
        let mut t = SequenceTracker::default();
        t.observe(ip(1), 10);
        let dup = t.observe(ip(1), 10).unwrap();
        assert_eq!(dup.lost, -1);
        let back = t.observe(ip(1), 4).unwrap();
        assert_eq!((back.expected, back.received, back.lost), (11, 4, -7));
        // Entry is overwritten even after a gap.
        assert_eq!(t.observe(ip(1), 5), None);
    }

    #[test]
    fn clients_are_tracked_independently() {
        let mut t = SequenceTracker::default();
        t.observe(ip(1), 1);
        t.observe(ip(2), 100);
        assert_eq!(t.observe(ip(1), 2), None);
        assert_eq!(t.observe(ip(2), 101), None);
    }

    #[test]
    fn counter_rollover_reports_a_negative_gap() {
        let mut t = SequenceTracker::default();
        t.observe(ip(1), u32::MAX);
        assert_eq!(
            t.observe(ip(1), 0),
            Some(SequenceGap {
                expected: 4_294_967_296,
                received: 0,
                lost: -4_294_967_296
            })
        );
        // Counting resumes normally from the new value.
        assert_eq!(t.observe(ip(1), 1), None);
    }

    #[test]
    fn least_recently_seen_client_is_evicted() {
        let mut t = SequenceTracker::with_capacity(2);
        t.observe(ip(1), 1);
        t.observe(ip(2), 1);
        // Touch 1 so that 2 becomes the oldest.
        t.observe(ip(1), 2);
        t.observe(ip(3), 1);

        assert_eq!(t.len(), 2);
        assert_eq!(t.last_seen(&ip(2)), None);
        assert_eq!(t.last_seen(&ip(1)), Some(2));
        assert_eq!(t.last_seen(&ip(3)), Some(1));

        // An evicted client starts over without a gap check.
        assert_eq!(t.observe(ip(2), 50), None);
    }

    #[test]
    fn recency_queue_stays_bounded_for_hot_clients() {
        let mut t = SequenceTracker::with_capacity(4);
        for seq in 0..1000 {
            t.observe(ip(1), seq);
        }
        assert!(t.order.len() <= 8);
        assert_eq!(t.len(), 1);
    }
}
