//! Property-based tests for ordered reassembly
//!
//! **Feature: seqpredict, Property 3: 乱序到达与结果顺序无关**

use seqpredict::rpc::ReassemblyBuffer;
use proptest::prelude::*;

/// A permutation of `0..n` plus a few duplicate deliveries
fn arb_arrivals() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..64).prop_flat_map(|n| {
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        let duplicates = prop::collection::vec(0..n, 0..8);
        (Just(n), order, duplicates).prop_map(|(n, mut order, duplicates)| {
            for (k, dup) in duplicates.into_iter().enumerate() {
                let at = (k * 7) % (order.len() + 1);
                order.insert(at, dup);
            }
            (n, order)
        })
    })
}

proptest! {
    /// Any arrival order yields the results in index order
    #[test]
    fn prop_order_independent((n, arrivals) in arb_arrivals()) {
        let mut buffer = ReassemblyBuffer::new(n);
        let mut accepted = 0;
        for (seq, index) in arrivals.iter().enumerate() {
            // First delivery of an index wins
            if buffer.insert(*index, (*index, seq)) {
                accepted += 1;
            }
        }
        prop_assert_eq!(accepted, n);
        prop_assert!(buffer.is_complete());
        prop_assert!(buffer.missing().is_empty());

        let ordered = buffer.into_ordered().unwrap();
        let indices: Vec<usize> = ordered.iter().map(|(i, _)| *i).collect();
        prop_assert_eq!(indices, (0..n).collect::<Vec<_>>());
        for (index, seq) in ordered {
            let first = arrivals.iter().position(|&i| i == index).unwrap();
            prop_assert_eq!(seq, first);
        }
    }

    /// Missing slots are reported and block completion
    #[test]
    fn prop_missing_reported(n in 1usize..64, skip in prop::collection::btree_set(0usize..64, 1..8)) {
        let mut buffer = ReassemblyBuffer::new(n);
        for i in (0..n).filter(|i| !skip.contains(i)) {
            buffer.insert(i, i);
        }
        let expected: Vec<usize> = skip.iter().copied().filter(|&i| i < n).collect();
        prop_assert_eq!(buffer.missing(), expected.clone());
        prop_assert_eq!(buffer.is_complete(), expected.is_empty());
        prop_assert_eq!(buffer.into_ordered().is_some(), expected.is_empty());
    }
}

#[test]
fn test_out_of_range_insert() {
    let mut buffer = ReassemblyBuffer::new(2);
    assert!(!buffer.insert(2, "late"));
    assert_eq!(buffer.filled(), 0);
}
