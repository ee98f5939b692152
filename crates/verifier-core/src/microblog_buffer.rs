//! Min-heap-by-`(date, id)` buffer for sampled-stream tweets.
//!
//! Grounded on `original_source/verifier/twitter/buffer.py`. Two details
//! worth calling out because they are easy to "fix" by accident while
//! porting:
//!
//! - When the buffer is at capacity, `add` never adds the surviving
//!   item's timestamp to `possible`, even if that timestamp's second
//!   matches `second_start` — only the below-capacity path does that.
//! - `check_marker` has no up-front presence guard: it always starts
//!   draining the heap, and returns `false` with an **empty** buffer if
//!   the marker is never found (see SPEC_FULL §5.3).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use chrono::{NaiveDateTime, Timelike};

use crate::tweet::Tweet;

#[derive(Debug, Clone)]
struct HeapEntry(Tweet);

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

/// Bounded min-heap of tweets ordered by `(date, id)`.
pub struct MicroblogBuffer {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    possible: HashSet<String>,
    second_start: u32,
    capacity: usize,
}

impl MicroblogBuffer {
    #[must_use]
    pub fn new(capacity: usize, second_start: u32) -> Self {
        Self {
            heap: BinaryHeap::new(),
            possible: HashSet::new(),
            second_start,
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

    #[must_use]
    pub fn possible(&self) -> usize {
        self.possible.len()
    }

    pub fn add(&mut self, tweet: Tweet) {
        if self.heap.len() == self.capacity {
            self.heap.push(Reverse(HeapEntry(tweet)));
            if let Some(Reverse(HeapEntry(evicted))) = self.heap.pop() {
                self.possible.remove(&evicted.created_at);
            }
        } else {
            let is_candidate = tweet.date.second() == self.second_start;
            let created_at = tweet.created_at.clone();
            self.heap.push(Reverse(HeapEntry(tweet)));
            if is_candidate {
                self.possible.insert(created_at);
            }
        }
    }

    /// Drains the heap looking for `marker`, re-adding it (and marking
    /// it a candidate) on a hit. Returns `false`, with the heap left
    /// empty, if `marker` is never found.
    pub fn check_marker(&mut self, marker: NaiveDateTime) -> bool {
        while let Some(Reverse(HeapEntry(tweet))) = self.heap.pop() {
            self.possible.remove(&tweet.created_at);
            if tweet.date == marker {
                let created_at = tweet.created_at.clone();
                self.heap.push(Reverse(HeapEntry(tweet)));
                self.possible.insert(created_at);
                return true;
            }
        }
        false
    }

    /// Pops every tweet with `date <= end_date`, in ascending
    /// `(date, id)` order, pushing back the first tweet past the
    /// cutoff (if any).
    pub fn get_list(&mut self, end_date: NaiveDateTime) -> Vec<Tweet> {
        let mut items = Vec::new();
        while let Some(Reverse(HeapEntry(tweet))) = self.heap.pop() {
            self.possible.remove(&tweet.created_at);
            if tweet.date <= end_date {
                items.push(tweet);
            } else {
                let created_at = tweet.created_at.clone();
                self.heap.push(Reverse(HeapEntry(tweet)));
                self.possible.insert(created_at);
                break;
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(id: u64, iso: &str) -> Tweet {
        Tweet::new(id, iso, "author", "text").unwrap()
    }

    #[test]
    fn bounded_by_capacity() {
        let mut buf = MicroblogBuffer::new(2, 30);
        buf.add(tweet(1, "2025-01-01T12:00:01.000Z"));
        buf.add(tweet(2, "2025-01-01T12:00:02.000Z"));
        buf.add(tweet(3, "2025-01-01T12:00:03.000Z"));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn candidate_tracked_only_below_capacity() {
        let mut buf = MicroblogBuffer::new(1, 30);
        buf.add(tweet(1, "2025-01-01T12:00:30.000Z"));
        assert_eq!(buf.possible(), 1);
        // at capacity now; next add evicts the old min and does not
        // register the survivor as a candidate even though its second matches
        buf.add(tweet(2, "2025-01-01T12:05:30.000Z"));
        assert_eq!(buf.possible(), 0);
    }

    #[test]
    fn check_marker_hit_reinserts_and_marks_candidate() {
        let mut buf = MicroblogBuffer::new(10, 30);
        buf.add(tweet(1, "2025-01-01T12:00:01.000Z"));
        buf.add(tweet(2, "2025-01-01T12:00:02.000Z"));
        let target = tweet(2, "2025-01-01T12:00:02.000Z").date;
        assert!(buf.check_marker(target));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.possible(), 1);
    }

    #[test]
    fn check_marker_miss_drains_buffer() {
        let mut buf = MicroblogBuffer::new(10, 30);
        buf.add(tweet(1, "2025-01-01T12:00:01.000Z"));
        let missing = tweet(99, "2099-01-01T00:00:00.000Z").date;
        assert!(!buf.check_marker(missing));
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn get_list_stops_at_cutoff() {
        let mut buf = MicroblogBuffer::new(10, 30);
        buf.add(tweet(1, "2025-01-01T12:00:01.000Z"));
        buf.add(tweet(2, "2025-01-01T12:00:05.000Z"));
        buf.add(tweet(3, "2025-01-01T12:00:10.000Z"));
        let cutoff = tweet(2, "2025-01-01T12:00:05.000Z").date;
        let list = buf.get_list(cutoff);
        assert_eq!(list.len(), 2);
        assert_eq!(buf.len(), 1);
    }
}
