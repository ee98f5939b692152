//! Min-heap-by-`(date, id)` buffer for seismology bulletin rows, with a
//! marker uniqueness set.
//!
//! Grounded on `original_source/verifier/earthquake/buffer.py`. Unlike
//! the microblog buffer, `check_marker` here guards on the uniqueness
//! set before touching the heap at all, so a miss is a cheap no-op
//! rather than a full drain (SPEC_FULL §5.4).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use crate::seism_event::SeismEvent;

#[derive(Debug, Clone)]
struct HeapEntry(SeismEvent);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.heap_key() == other.0.heap_key()
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.heap_key().cmp(&other.0.heap_key())
    }
}

/// Bounded min-heap of seismology events, deduplicated by marker.
pub struct SeismologyBuffer {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    markers: HashSet<String>,
    capacity: usize,
}

impl SeismologyBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            markers: HashSet::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Every buffered event is a candidate (spec.md §4.2).
    #[must_use]
    pub fn possible(&self) -> usize {
        self.heap.len()
    }

    /// Skips events whose marker is already buffered.
    pub fn add(&mut self, event: SeismEvent) {
        let marker = event.marker();
        if self.markers.contains(&marker) {
            return;
        }
        if self.heap.len() == self.capacity {
            self.heap.push(Reverse(HeapEntry(event)));
            if let Some(Reverse(HeapEntry(evicted))) = self.heap.pop() {
                self.markers.remove(&evicted.marker());
            }
            self.markers.insert(marker);
        } else {
            self.markers.insert(marker);
            self.heap.push(Reverse(HeapEntry(event)));
        }
    }

    /// `false` immediately if `marker` was never buffered; otherwise
    /// drains down to (and re-adds) the matching event.
    pub fn check_marker(&mut self, marker: &str) -> bool {
        if !self.markers.contains(marker) {
            return false;
        }
        loop {
            let Some(Reverse(HeapEntry(event))) = self.heap.pop() else {
                return false;
            };
            let event_marker = event.marker();
            self.markers.remove(&event_marker);
            if event_marker == marker {
                self.markers.insert(event_marker);
                self.heap.push(Reverse(HeapEntry(event)));
                return true;
            }
        }
    }

    /// Peeks the date-minimum event without removing it.
    pub fn get_first(&mut self) -> Option<SeismEvent> {
        let Reverse(HeapEntry(event)) = self.heap.pop()?;
        self.heap.push(Reverse(HeapEntry(event.clone())));
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, date: &str) -> SeismEvent {
        SeismEvent::new(id, date, "-33", "-70", "10", "4.5").unwrap()
    }

    #[test]
    fn bounded_by_capacity() {
        let mut buf = SeismologyBuffer::new(2);
        buf.add(event("s1", "12:00:00 01/01/2025"));
        buf.add(event("s2", "13:00:00 01/01/2025"));
        buf.add(event("s3", "14:00:00 01/01/2025"));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn duplicate_marker_is_skipped() {
        let mut buf = SeismologyBuffer::new(10);
        buf.add(event("s1", "12:00:00 01/01/2025"));
        buf.add(event("s1", "12:00:00 01/01/2025"));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn check_marker_miss_is_cheap_noop() {
        let mut buf = SeismologyBuffer::new(10);
        buf.add(event("s1", "12:00:00 01/01/2025"));
        assert!(!buf.check_marker("not-a-real-marker"));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn check_marker_hit_then_get_first() {
        let mut buf = SeismologyBuffer::new(10);
        let s1 = event("s1", "12:00:00 01/01/2025");
        let marker = s1.marker();
        buf.add(s1);
        buf.add(event("s2", "13:00:00 01/01/2025"));
        assert!(buf.check_marker(&marker));
        assert_eq!(buf.get_first().unwrap().marker(), marker);
    }

    #[test]
    fn possible_equals_len() {
        let mut buf = SeismologyBuffer::new(10);
        buf.add(event("s1", "12:00:00 01/01/2025"));
        buf.add(event("s2", "13:00:00 01/01/2025"));
        assert_eq!(buf.possible(), buf.len());
    }
}
