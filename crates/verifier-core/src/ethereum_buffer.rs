//! FIFO insertion-ordered buffer for Ethereum blocks, keyed by block
//! number, merging hash sets on a repeated key.
//!
//! Grounded on `original_source/verifier/ethereum/buffer.py`: unlike the
//! radio buffer, a second `add` for an already-buffered marker does not
//! create a new entry or move it in the ordering — it merges the new
//! block's hashes into the existing one in place.

use indexmap::IndexMap;

use crate::eth_block::EthBlock;

/// Bounded, insertion-ordered buffer of Ethereum blocks.
pub struct EthereumBuffer {
    buffer: IndexMap<String, EthBlock>,
    capacity: usize,
}

impl EthereumBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: IndexMap::new(),
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

    /// Total hash count across every buffered block.
    #[must_use]
    pub fn total_hashes(&self) -> usize {
        self.buffer.values().map(|b| b.hashes.len()).sum()
    }

    /// Iterates buffered blocks without mutating buffer order.
    pub fn blocks(&self) -> impl Iterator<Item = &EthBlock> {
        self.buffer.values()
    }

    /// Union of every hash observed across all buffered blocks.
    #[must_use]
    pub fn hashes_set(&self) -> std::collections::HashSet<String> {
        let mut out = std::collections::HashSet::new();
        for block in self.buffer.values() {
            out.extend(block.hashes.iter().cloned());
        }
        out
    }

    /// Merges into the existing entry on a repeated marker; otherwise
    /// appends. Evicts the oldest entry once over capacity.
    pub fn add(&mut self, block: EthBlock) {
        let marker = block.marker();
        if let Some(existing) = self.buffer.get_mut(&marker) {
            existing.merge(&block);
        } else {
            self.buffer.insert(marker, block);
        }
        if self.buffer.len() > self.capacity {
            self.buffer.shift_remove_index(0);
        }
    }

    /// Drops every entry older than `marker`, leaving `marker` at the
    /// front. Returns `false` (no mutation) if `marker` is absent.
    pub fn check_marker(&mut self, marker: &str) -> bool {
        if !self.buffer.contains_key(marker) {
            return false;
        }
        while self
            .buffer
            .get_index(0)
            .is_some_and(|(key, _)| key != marker)
        {
            self.buffer.shift_remove_index(0);
        }
        self.buffer.move_index(
            self.buffer.get_index_of(marker).expect("marker still present"),
            0,
        );
        true
    }

    /// Peeks the oldest buffered block without removing it.
    pub fn get_first(&mut self) -> Option<EthBlock> {
        let (key, block) = self.buffer.shift_remove_index(0)?;
        let result = block.clone();
        self.buffer.insert(key, block);
        self.buffer.move_index(self.buffer.len() - 1, 0);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_by_capacity() {
        let mut buf = EthereumBuffer::new(2);
        buf.add(EthBlock::new(1, ["a".into()]));
        buf.add(EthBlock::new(2, ["b".into()]));
        buf.add(EthBlock::new(3, ["c".into()]));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn repeated_marker_merges_hashes_in_place() {
        let mut buf = EthereumBuffer::new(10);
        buf.add(EthBlock::new(1, ["a".into()]));
        buf.add(EthBlock::new(2, ["b".into()]));
        buf.add(EthBlock::new(1, ["c".into()]));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.get_first().unwrap().number, 1);
        assert_eq!(buf.total_hashes(), 3);
    }

    #[test]
    fn check_marker_drops_older_entries() {
        let mut buf = EthereumBuffer::new(10);
        buf.add(EthBlock::new(1, ["a".into()]));
        buf.add(EthBlock::new(2, ["b".into()]));
        buf.add(EthBlock::new(3, ["c".into()]));
        assert!(buf.check_marker("2"));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.get_first().unwrap().number, 2);
    }

    #[test]
    fn hashes_set_is_union_of_all_blocks() {
        let mut buf = EthereumBuffer::new(10);
        buf.add(EthBlock::new(1, ["a".into()]));
        buf.add(EthBlock::new(2, ["b".into()]));
        assert_eq!(buf.hashes_set().len(), 2);
    }
}
