//! FIFO insertion-ordered buffer for radio frames, keyed by marker.
//!
//! Grounded on `original_source/verifier/radio/buffer.py`: an
//! insertion-ordered map evicts the oldest entry on overflow,
//! `check_marker` pops from the front until it finds (and re-inserts)
//! the target marker, and `get_list` only pops once the buffer holds at
//! least as many frames as requested.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::radio_frame::RadioFrame;

/// Bounded, insertion-ordered buffer of radio frames.
pub struct RadioBuffer {
    buffer: IndexMap<String, RadioFrame>,
    possible: HashSet<String>,
    prefix: String,
    capacity: usize,
}

impl RadioBuffer {
    #[must_use]
    pub fn new(capacity: usize, prefix: impl Into<String>) -> Self {
        Self {
            buffer: IndexMap::new(),
            possible: HashSet::new(),
            prefix: prefix.into(),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of buffered markers lexicographically within the
    /// configured prefix's admissible range.
    #[must_use]
    pub fn possible(&self) -> usize {
        self.possible.len()
    }

    /// Candidacy limit for a marker of the given length: `prefix || "f"*n`.
    fn limit(&self, marker_len: usize) -> String {
        let mut limit = self.prefix.clone();
        limit.extend(std::iter::repeat('f').take(marker_len.saturating_sub(self.prefix.len())));
        limit
    }

    pub fn add(&mut self, frame: RadioFrame) {
        let marker = frame.marker();
        let limit = self.limit(marker.len());
        if marker <= limit {
            self.possible.insert(marker.clone());
        }
        self.buffer.insert(marker, frame);
        if self.buffer.len() > self.capacity {
            if let Some((evicted, _)) = self.buffer.shift_remove_index(0) {
                self.possible.remove(&evicted);
            }
        }
    }

    /// Drops every entry older than `marker`, leaving `marker` at the
    /// front. Returns `false` (no mutation) if `marker` is absent.
    pub fn check_marker(&mut self, marker: &str) -> bool {
        if !self.buffer.contains_key(marker) {
            return false;
        }
        loop {
            let (key, _) = self.buffer.get_index(0).expect("marker was present");
            if key == marker {
                break;
            }
            let (evicted, _) = self.buffer.shift_remove_index(0).expect("front entry exists");
            self.possible.remove(&evicted);
        }
        self.buffer.move_index(
            self.buffer.get_index_of(marker).expect("marker still present"),
            0,
        );
        true
    }

    /// Pops and returns the first `count` frames in FIFO order, or an
    /// empty vec (without mutating the buffer) if fewer than `count`
    /// frames are currently buffered.
    pub fn get_list(&mut self, count: usize) -> Vec<RadioFrame> {
        if self.buffer.len() < count {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let (key, frame) = self.buffer.shift_remove_index(0).expect("buffer has enough entries");
            self.possible.remove(&key);
            out.push(frame);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio_frame::FrameHeader;

    fn frame_with_body(byte2_top: u8) -> RadioFrame {
        // distinct body content to get distinct markers
        let header = FrameHeader::parse([0xff, 0xf0 | 0x08 | 0x02, 0x09 << 4, byte2_top]).unwrap();
        RadioFrame::new(header, vec![byte2_top; 417])
    }

    #[test]
    fn bounded_by_capacity() {
        let mut buf = RadioBuffer::new(2, "00");
        buf.add(frame_with_body(1));
        buf.add(frame_with_body(2));
        buf.add(frame_with_body(3));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn check_marker_drops_older_entries() {
        let mut buf = RadioBuffer::new(10, "00");
        let f1 = frame_with_body(1);
        let f2 = frame_with_body(2);
        let f3 = frame_with_body(3);
        let m2 = f2.marker();
        buf.add(f1);
        buf.add(f2);
        buf.add(f3);
        assert!(buf.check_marker(&m2));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn check_marker_miss_does_not_mutate() {
        let mut buf = RadioBuffer::new(10, "00");
        buf.add(frame_with_body(1));
        assert!(!buf.check_marker("deadbeef"));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn get_list_requires_full_count() {
        let mut buf = RadioBuffer::new(10, "00");
        buf.add(frame_with_body(1));
        assert!(buf.get_list(2).is_empty());
        assert_eq!(buf.len(), 1);
        buf.add(frame_with_body(2));
        let frames = buf.get_list(2);
        assert_eq!(frames.len(), 2);
        assert_eq!(buf.len(), 0);
    }
}
