//! Property-based tests for request chunking
//!
//! **Feature: seqpredict, Property 2: 分块确定性与覆盖完整性**

use seqpredict::core::{Interval, OutputType, SequenceLength, Variant};
use seqpredict::rpc::message::RequestPayload;
use seqpredict::rpc::{plan, tile_locus, LogicalRequest, Organism, OutputSelection, ServiceLimits};
use seqpredict::scoring::{AggregationType, CenterMaskScorer, VariantScorer};
use proptest::prelude::*;

fn selection() -> OutputSelection {
    OutputSelection {
        organism: Organism::HomoSapiens,
        requested_outputs: vec![],
        ontology_terms: vec![],
    }
}

fn arb_scorer() -> impl Strategy<Value = VariantScorer> {
    (
        prop::sample::select(vec![OutputType::Atac, OutputType::Dnase, OutputType::RnaSeq, OutputType::Cage]),
        prop::sample::select(vec![501u64, 2_001]),
        prop::sample::select(vec![AggregationType::DiffMean, AggregationType::L2Diff, AggregationType::ActiveSum]),
    )
        .prop_map(|(output, width, aggregation)| CenterMaskScorer::new(output, Some(width), aggregation).into())
}

/// SNVs with a 16KB context centred on them
fn arb_pairs() -> impl Strategy<Value = Vec<(Interval, Variant)>> {
    prop::collection::vec(100_000u64..10_000_000, 1..6).prop_map(|positions| {
        positions
            .into_iter()
            .map(|pos| {
                let variant = Variant::new("chr7", pos, "A", "G").unwrap();
                let interval = variant.reference_interval().resize(16_384).unwrap();
                (interval, variant)
            })
            .collect()
    })
}

fn arb_limits() -> impl Strategy<Value = ServiceLimits> {
    (1usize..25, 1u64..16).prop_map(|(scorers, window)| ServiceLimits {
        max_scorers_per_request: scorers,
        max_ism_window: window,
        ..ServiceLimits::default()
    })
}

proptest! {
    /// Planning the same request twice gives identical plans
    #[test]
    fn prop_plan_is_deterministic(
        pairs in arb_pairs(),
        scorers in prop::collection::vec(arb_scorer(), 1..50),
        limits in arb_limits(),
    ) {
        let request = LogicalRequest::ScoreVariants { pairs, scorers };
        let a = plan(&request, &selection(), &limits).unwrap();
        let b = plan(&request, &selection(), &limits).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Each variant's chunks cover its scorers once, in order, within the batch limit
    #[test]
    fn prop_scorer_batches_cover_in_order(
        pairs in arb_pairs(),
        scorers in prop::collection::vec(arb_scorer(), 1..50),
        limits in arb_limits(),
    ) {
        let request = LogicalRequest::ScoreVariants { pairs: pairs.clone(), scorers: scorers.clone() };
        let plan = plan(&request, &selection(), &limits).unwrap();
        let per_variant = scorers.len().div_ceil(limits.max_scorers_per_request);
        prop_assert_eq!(plan.len(), pairs.len() * per_variant);
        prop_assert_eq!(plan.groups, pairs.len());

        for (group, indices) in plan.chunks_by_group().iter().enumerate() {
            let mut next = 0;
            for &i in indices {
                let chunk = &plan.chunks[i];
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.group, group);
                prop_assert_eq!(chunk.scorers.start, next);
                prop_assert!(chunk.scorers.len() <= limits.max_scorers_per_request);
                next = chunk.scorers.end;
                match &chunk.payload {
                    RequestPayload::ScoreVariant { scorers: batch, selection, variant, .. } => {
                        prop_assert_eq!(&batch[..], &scorers[chunk.scorers.clone()]);
                        prop_assert_eq!(variant, &pairs[group].1);
                        // Every scorer's modality is requested
                        prop_assert!(batch.iter().all(|s| selection.requested_outputs.contains(&s.requested_output())));
                    }
                    other => prop_assert!(false, "unexpected payload {:?}", other),
                }
            }
            prop_assert_eq!(next, scorers.len());
        }
    }

    /// ISM windows are disjoint, bounded and cover the requested window
    #[test]
    fn prop_ism_windows_cover(
        offset in 600u64..1_400,
        width in 1u64..40,
        limits in arb_limits(),
    ) {
        let interval = Interval::new("chr2", 0, 2_048).unwrap();
        let window = Interval::new("chr2", offset, offset + width).unwrap();
        let scorer: VariantScorer = CenterMaskScorer::new(OutputType::Dnase, Some(501), AggregationType::DiffMean).into();
        let request = LogicalRequest::ScoreIsm { interval, window: window.clone(), scorers: vec![scorer] };
        let plan = plan(&request, &selection(), &limits).unwrap();

        let mut cursor = window.start();
        for chunk in &plan.chunks {
            match &chunk.payload {
                RequestPayload::ScoreIsm { window: sub, .. } => {
                    prop_assert_eq!(sub.start(), cursor);
                    prop_assert!(sub.width() >= 1 && sub.width() <= limits.max_ism_window);
                    cursor = sub.end();
                }
                other => prop_assert!(false, "unexpected payload {:?}", other),
            }
        }
        prop_assert_eq!(cursor, window.end());
    }

    /// Locus tiles are contiguous, full-length and cover the locus
    #[test]
    fn prop_tile_locus_covers(start in 0u64..1_000_000, width in 1u64..600_000) {
        let locus = Interval::new("chr3", start, start + width).unwrap();
        let tiles = tile_locus(&locus, SequenceLength::Kb100).unwrap();
        prop_assert_eq!(tiles.len() as u64, width.div_ceil(131_072));
        prop_assert_eq!(tiles[0].start(), locus.start());
        prop_assert!(tiles.iter().all(|t| t.width() == 131_072));
        prop_assert!(tiles[tiles.len() - 1].end() >= locus.end());
        for pair in tiles.windows(2) {
            prop_assert_eq!(pair[0].end(), pair[1].start());
        }
    }
}

#[test]
fn test_interval_width_must_be_supported() {
    let selection = OutputSelection {
        requested_outputs: vec![OutputType::Dnase],
        ..selection()
    };
    let request = LogicalRequest::Intervals {
        intervals: vec![Interval::new("chr1", 0, 2_048).unwrap(), Interval::new("chr1", 0, 2_000).unwrap()],
    };
    assert!(plan(&request, &selection, &ServiceLimits::default()).is_err());
}

#[test]
fn test_variant_outside_interval() {
    let selection = OutputSelection {
        requested_outputs: vec![OutputType::Dnase],
        ..selection()
    };
    let request = LogicalRequest::Variants {
        pairs: vec![(
            Interval::new("chr1", 0, 2_048).unwrap(),
            Variant::new("chr1", 5_000, "A", "T").unwrap(),
        )],
    };
    assert!(plan(&request, &selection, &ServiceLimits::default()).is_err());
}
