//! Property tests for the universal buffer invariants spec.md §8 names:
//! the size bound holds after every insertion, and `check_marker` is
//! idempotent (a second call for the same marker returns the same
//! result and leaves the buffer in an equivalent state).
//!
//! Exercised against `EthereumBuffer` and `RadioBuffer`, the two
//! disciplines whose entries are cheap to generate without a date
//! parser in the loop.

use proptest::prelude::*;

use verifier_core::radio_frame::FrameHeader;
use verifier_core::{EthBlock, EthereumBuffer, RadioBuffer, RadioFrame};

fn radio_frame(seed: u8) -> RadioFrame {
    let header = FrameHeader::parse([0xff, 0xf0 | 0x08 | 0x02, 0x09 << 4, 0x00]).expect("valid header");
    // vary the body so distinct seeds produce distinct markers
    RadioFrame::new(header, vec![seed; 417])
}

proptest! {
    #[test]
    fn ethereum_buffer_never_exceeds_capacity(
        capacity in 1usize..16,
        numbers in prop::collection::vec(0u64..200, 0..300),
    ) {
        let mut buffer = EthereumBuffer::new(capacity);
        for number in &numbers {
            buffer.add(EthBlock::new(*number, [format!("hash-{number}")]));
            prop_assert!(buffer.len() <= capacity);
        }
    }

    #[test]
    fn ethereum_buffer_check_marker_is_idempotent(
        capacity in 4usize..16,
        numbers in prop::collection::vec(0u64..50, 1..100),
        target_index in 0usize..50,
    ) {
        let mut buffer = EthereumBuffer::new(capacity);
        for number in &numbers {
            buffer.add(EthBlock::new(*number, [format!("hash-{number}")]));
        }
        let marker = (target_index as u64).to_string();
        let first = buffer.check_marker(&marker);
        let len_after_first = buffer.len();
        let second = buffer.check_marker(&marker);
        prop_assert_eq!(first, second);
        prop_assert_eq!(len_after_first, buffer.len());
    }

    #[test]
    fn radio_buffer_never_exceeds_capacity(
        capacity in 1usize..16,
        seeds in prop::collection::vec(any::<u8>(), 0..300),
    ) {
        let mut buffer = RadioBuffer::new(capacity, "00");
        for seed in seeds {
            buffer.add(radio_frame(seed));
            prop_assert!(buffer.len() <= capacity);
        }
    }

    #[test]
    fn radio_buffer_check_marker_hit_positions_marker_first(
        seeds in prop::collection::vec(any::<u8>(), 1..40),
    ) {
        let mut buffer = RadioBuffer::new(100, "00");
        let mut markers = Vec::new();
        for seed in &seeds {
            let frame = radio_frame(*seed);
            markers.push(frame.marker());
            buffer.add(frame);
        }
        // dedup: identical seeds collide on marker, which is fine — just
        // pick a marker we know is still present.
        let target = markers.last().unwrap().clone();
        let first = buffer.check_marker(&target);
        let second = buffer.check_marker(&target);
        prop_assert_eq!(first, second);
        prop_assert!(first);
    }
}
