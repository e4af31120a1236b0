//! Indexed min-heap keyed by `(priorityValue, dueTimestamp, seq)` (spec
//! §4.2 "queueing discipline"; Design Notes: "Priority queues with
//! dynamic re-ranking: use an indexed min-heap ... for starvation
//! compensation, apply a virtual priority on dequeue rather than
//! mutating heap entries in place").
//!
//! Backed by `std::collections::BinaryHeap` (via `Reverse`, so the
//! smallest key pops first) -- no external priority-queue crate is
//! needed for a queue this shape.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

/// Ordering key for one heap entry. `seq` is the monotonically
/// increasing submission order, used to break ties between equal
/// `(priority_value, due)` pairs (spec §4.2: "Ties broken by submission
/// order").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityKey {
    pub priority_value: u8,
    pub due: DateTime<Utc>,
    pub seq: u64,
}

/// A min-heap of `(PriorityKey, T)` pairs. Lower `priority_value` sorts
/// first; among equal priority, earlier `due` then earlier `seq` sorts
/// first.
pub struct PriorityHeap<T> {
    heap: BinaryHeap<Reverse<(PriorityKey, u64)>>,
    items: std::collections::HashMap<u64, T>,
    next_seq: u64,
}

impl<T> Default for PriorityHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityHeap<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            items: std::collections::HashMap::new(),
            next_seq: 0,
        }
    }

    /// Next submission sequence number, for callers constructing a
    /// `PriorityKey`.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn push(&mut self, key: PriorityKey, item: T) {
        self.items.insert(key.seq, item);
        self.heap.push(Reverse((key, key.seq)));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pop the entry with the smallest key.
    pub fn pop(&mut self) -> Option<(PriorityKey, T)> {
        let Reverse((key, seq)) = self.heap.pop()?;
        let item = self.items.remove(&seq)?;
        Some((key, item))
    }

    /// Pop the entry with the smallest *effective* key, where
    /// `boost(key)` computes a virtual priority value used only for this
    /// comparison (spec §4.2: "for schedules older than 60 min in queue,
    /// boost their effective priority by `min(100, ageMinutes × 0.5)`").
    ///
    /// This never mutates a retained heap entry's stored key -- it scans
    /// the heap once, picks the best candidate under the boosted
    /// ordering, and removes only that one entry. O(n) in queue depth,
    /// which is acceptable at the scheduler's expected scale (spec
    /// default `maxQueueSize = 1000`).
    pub fn pop_with_boost(&mut self, boost: impl Fn(&PriorityKey) -> u8) -> Option<(PriorityKey, T)> {
        let best_seq = self
            .heap
            .iter()
            .map(|Reverse((key, seq))| (*seq, boost(key), key.due, *seq))
            .min_by(|a, b| (a.1, a.2, a.3).cmp(&(b.1, b.2, b.3)))
            .map(|(seq, ..)| seq)?;

        let mut rest = Vec::with_capacity(self.heap.len());
        let mut found = None;
        for entry in self.heap.drain() {
            let Reverse((_, seq)) = entry;
            if seq == best_seq && found.is_none() {
                found = Some(entry);
            } else {
                rest.push(entry);
            }
        }
        self.heap = rest.into_iter().collect();

        let Reverse((key, seq)) = found?;
        let item = self.items.remove(&seq)?;
        Some((key, item))
    }

    pub fn iter_keys(&self) -> impl Iterator<Item = &PriorityKey> {
        self.heap.iter().map(|Reverse((key, _))| key)
    }

    /// Iterate `(key, item)` pairs without removing anything. Used by
    /// callers that need to inspect a specific still-queued item by some
    /// property of `T` (e.g. an id) rather than by key.
    pub fn iter_keys_and_items(&self) -> impl Iterator<Item = (&PriorityKey, &T)> {
        self.heap
            .iter()
            .map(|Reverse((key, seq))| (key, self.items.get(seq).expect("heap entry without a backing item")))
    }

    /// Remove the first entry for which `matches` returns true, without
    /// disturbing the relative order of the rest. Used to pull a single
    /// still-queued item out ahead of its turn (spec §4.1 `Cancel`: "If
    /// the execution is still in queue, it is removed").
    pub fn remove_by(&mut self, matches: impl Fn(&T) -> bool) -> Option<(PriorityKey, T)> {
        let target_seq = self
            .items
            .iter()
            .find(|(_, item)| matches(item))
            .map(|(seq, _)| *seq)?;

        let mut rest = Vec::with_capacity(self.heap.len());
        let mut found_key = None;
        for entry in self.heap.drain() {
            let Reverse((key, seq)) = entry;
            if seq == target_seq && found_key.is_none() {
                found_key = Some(key);
            } else {
                rest.push(entry);
            }
        }
        self.heap = rest.into_iter().collect();

        let item = self.items.remove(&target_seq)?;
        Some((found_key?, item))
    }
}
