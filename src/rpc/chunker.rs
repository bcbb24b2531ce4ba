//! Request chunking
//!
//! Turns one logical request into RPC-sized chunks that respect the service
//! limits. Planning is a pure function of the request: the same request
//! always yields the same chunks in the same order. Every check that can
//! fail runs here, before any network traffic.

use crate::core::dna;
use crate::core::error::{CoordinateError, RequestError};
use crate::core::genome::{Interval, SequenceLength, Variant};
use crate::core::output::OutputType;
use crate::rpc::config::ServiceLimits;
use crate::rpc::message::{OutputSelection, RequestPayload};
use crate::scoring::VariantScorer;
use serde::Serialize;
use std::ops::Range;

/// A caller-level request before chunking
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalRequest {
    Sequence {
        sequence: String,
    },
    Intervals {
        intervals: Vec<Interval>,
    },
    Locus {
        locus: Interval,
        tile_length: SequenceLength,
    },
    Variants {
        pairs: Vec<(Interval, Variant)>,
    },
    ScoreVariants {
        pairs: Vec<(Interval, Variant)>,
        scorers: Vec<VariantScorer>,
    },
    ScoreIsm {
        interval: Interval,
        window: Interval,
        scorers: Vec<VariantScorer>,
    },
}

/// One chunk of a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChunk {
    pub index: usize,
    /// Item of the logical request this chunk belongs to (interval, tile, variant or ISM window)
    pub group: usize,
    /// Caller-order scorer indices covered by this chunk
    pub scorers: Range<usize>,
    /// Interval the returned predictions must cover
    pub target: Interval,
    /// Human-readable region for error reports
    pub region: String,
    pub payload: RequestPayload,
}

/// Ordered chunks for one logical request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkPlan {
    pub chunks: Vec<PlannedChunk>,
    /// Number of groups (items) in the logical request
    pub groups: usize,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk indices of each group, in order
    pub fn chunks_by_group(&self) -> Vec<Vec<usize>> {
        let mut by_group = vec![Vec::new(); self.groups];
        for chunk in &self.chunks {
            by_group[chunk.group].push(chunk.index);
        }
        by_group
    }
}

/// Check a CURIE such as `UBERON:0001157` or `EFO:0002067`
pub fn is_ontology_curie(term: &str) -> bool {
    match term.split_once(':') {
        Some((prefix, id)) => {
            !prefix.is_empty()
                && !id.is_empty()
                && prefix.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                && id
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        }
        None => false,
    }
}

fn check_selection(selection: &OutputSelection, limits: &ServiceLimits) -> Result<(), RequestError> {
    if selection.requested_outputs.is_empty() {
        return Err(RequestError::NoOutputs);
    }
    let count = selection.ontology_terms.len();
    if count > limits.max_ontology_terms {
        return Err(RequestError::TooManyOntologyTerms {
            count,
            max: limits.max_ontology_terms,
        });
    }
    if let Some(bad) = selection.ontology_terms.iter().find(|t| !is_ontology_curie(t)) {
        return Err(RequestError::InvalidOntologyTerm(bad.clone()));
    }
    Ok(())
}

fn check_length(width: u64) -> Result<SequenceLength, RequestError> {
    SequenceLength::from_width(width).ok_or(RequestError::UnsupportedSequenceLength(width))
}

fn check_variant(interval: &Interval, variant: &Variant) -> Result<(), RequestError> {
    check_length(interval.width())?;
    if !variant.is_within(interval) {
        return Err(RequestError::VariantOutsideInterval {
            variant: variant.to_string(),
            interval: interval.to_string(),
        });
    }
    Ok(())
}

/// Outputs read by `scorers`, first-seen order
fn scorer_outputs(scorers: &[VariantScorer]) -> Vec<OutputType> {
    let mut outputs = Vec::new();
    for scorer in scorers {
        let output = scorer.requested_output();
        if !outputs.contains(&output) {
            outputs.push(output);
        }
    }
    outputs
}

/// Contiguous scorer batches of at most `max` scorers
fn scorer_batches(count: usize, max: usize) -> Vec<Range<usize>> {
    (0..count)
        .step_by(max.max(1))
        .map(|start| start..(start + max).min(count))
        .collect()
}

/// Cover `locus` with consecutive `tile_length` tiles
///
/// The last tile may extend past the locus end.
pub fn tile_locus(locus: &Interval, tile_length: SequenceLength) -> Result<Vec<Interval>, RequestError> {
    if locus.is_empty() {
        return Err(RequestError::Empty("locus"));
    }
    let length = tile_length.bases();
    let tiles = locus.width().div_ceil(length);
    (0..tiles)
        .map(|i| {
            let start = locus.start() + i * length;
            Interval::new(locus.chromosome(), start, start + length)
                .map(|t| t.with_strand(locus.strand()))
                .map_err(RequestError::from)
        })
        .collect()
}

struct PlanBuilder {
    chunks: Vec<PlannedChunk>,
}

impl PlanBuilder {
    fn push(&mut self, group: usize, scorers: Range<usize>, region: String, payload: RequestPayload) -> Result<(), RequestError> {
        let target = payload.target_interval()?;
        self.chunks.push(PlannedChunk {
            index: self.chunks.len(),
            group,
            scorers,
            target,
            region,
            payload,
        });
        Ok(())
    }
}

/// Plan the chunks for `request`
pub fn plan(
    request: &LogicalRequest,
    selection: &OutputSelection,
    limits: &ServiceLimits,
) -> Result<ChunkPlan, RequestError> {
    let mut builder = PlanBuilder { chunks: Vec::new() };

    let groups = match request {
        LogicalRequest::Sequence { sequence } => {
            check_selection(selection, limits)?;
            let normalized = dna::normalize_bases(sequence)?;
            check_length(normalized.len() as u64)?;
            builder.push(
                0,
                0..0,
                format!("sequence of {} bp", sequence.len()),
                RequestPayload::PredictSequence {
                    sequence: normalized,
                    selection: selection.clone(),
                },
            )?;
            1
        }
        LogicalRequest::Intervals { intervals } => {
            check_selection(selection, limits)?;
            if intervals.is_empty() {
                return Err(RequestError::Empty("intervals"));
            }
            for (i, interval) in intervals.iter().enumerate() {
                check_length(interval.width())?;
                builder.push(
                    i,
                    0..0,
                    interval.to_string(),
                    RequestPayload::PredictInterval {
                        interval: interval.clone(),
                        selection: selection.clone(),
                    },
                )?;
            }
            intervals.len()
        }
        LogicalRequest::Locus { locus, tile_length } => {
            check_selection(selection, limits)?;
            let tiles = tile_locus(locus, *tile_length)?;
            for (i, tile) in tiles.iter().enumerate() {
                builder.push(
                    i,
                    0..0,
                    tile.to_string(),
                    RequestPayload::PredictInterval {
                        interval: tile.clone(),
                        selection: selection.clone(),
                    },
                )?;
            }
            tiles.len()
        }
        LogicalRequest::Variants { pairs } => {
            check_selection(selection, limits)?;
            if pairs.is_empty() {
                return Err(RequestError::Empty("variants"));
            }
            for (i, (interval, variant)) in pairs.iter().enumerate() {
                check_variant(interval, variant)?;
                builder.push(
                    i,
                    0..0,
                    format!("{} {}", interval, variant),
                    RequestPayload::PredictVariant {
                        interval: interval.clone(),
                        variant: variant.clone(),
                        selection: selection.clone(),
                    },
                )?;
            }
            pairs.len()
        }
        LogicalRequest::ScoreVariants { pairs, scorers } => {
            if pairs.is_empty() {
                return Err(RequestError::Empty("variants"));
            }
            if scorers.is_empty() {
                return Err(RequestError::Empty("scorers"));
            }
            let batches = scorer_batches(scorers.len(), limits.max_scorers_per_request);
            for (i, (interval, variant)) in pairs.iter().enumerate() {
                check_variant(interval, variant)?;
                for scorer in scorers {
                    scorer.validate_for(variant, interval)?;
                }
                for batch in &batches {
                    let batch_scorers = scorers[batch.clone()].to_vec();
                    let batch_selection = OutputSelection {
                        requested_outputs: scorer_outputs(&batch_scorers),
                        ..selection.clone()
                    };
                    check_selection(&batch_selection, limits)?;
                    builder.push(
                        i,
                        batch.clone(),
                        format!("{} {} scorers {}..{}", interval, variant, batch.start, batch.end),
                        RequestPayload::ScoreVariant {
                            interval: interval.clone(),
                            variant: variant.clone(),
                            selection: batch_selection,
                            scorers: batch_scorers,
                        },
                    )?;
                }
            }
            pairs.len()
        }
        LogicalRequest::ScoreIsm {
            interval,
            window,
            scorers,
        } => {
            check_length(interval.width())?;
            if scorers.is_empty() {
                return Err(RequestError::Empty("scorers"));
            }
            if window.is_empty() {
                return Err(RequestError::Empty("mutagenesis window"));
            }
            if !window.within(interval) {
                return Err(CoordinateError::OutOfBounds {
                    interval: window.to_string(),
                    boundary: interval.to_string(),
                }
                .into());
            }
            // Windows are monotone in position, so the two end bases bound every check
            for position in [window.start(), window.end() - 1] {
                let base = Interval::new(window.chromosome(), position, position + 1)?;
                for scorer in scorers {
                    scorer.validate_at(&base, interval)?;
                }
            }

            let windows = window.split_by_width(limits.max_ism_window)?;
            let batches = scorer_batches(scorers.len(), limits.max_scorers_per_request);
            for (i, sub_window) in windows.iter().enumerate() {
                for batch in &batches {
                    let batch_scorers = scorers[batch.clone()].to_vec();
                    let batch_selection = OutputSelection {
                        requested_outputs: scorer_outputs(&batch_scorers),
                        ..selection.clone()
                    };
                    check_selection(&batch_selection, limits)?;
                    builder.push(
                        i,
                        batch.clone(),
                        format!("{} ISM {} scorers {}..{}", interval, sub_window, batch.start, batch.end),
                        RequestPayload::ScoreIsm {
                            interval: interval.clone(),
                            window: sub_window.clone(),
                            selection: batch_selection,
                            scorers: batch_scorers,
                        },
                    )?;
                }
            }
            windows.len()
        }
    };

    log::debug!("Planned {} chunks over {} groups", builder.chunks.len(), groups);
    Ok(ChunkPlan {
        chunks: builder.chunks,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::message::Organism;
    use crate::scoring::{AggregationType, CenterMaskScorer};

    fn selection(outputs: &[OutputType]) -> OutputSelection {
        OutputSelection {
            organism: Organism::HomoSapiens,
            requested_outputs: outputs.to_vec(),
            ontology_terms: vec!["UBERON:0001157".to_string()],
        }
    }

    fn center(width: u64) -> VariantScorer {
        CenterMaskScorer::new(OutputType::RnaSeq, Some(width), AggregationType::DiffMean).into()
    }

    fn chr22() -> (Interval, Variant) {
        (
            "chr22:100000-116384:+".parse().unwrap(),
            Variant::new("chr22", 108_000, "A", "C").unwrap(),
        )
    }

    #[test]
    fn test_single_scorer_single_chunk() {
        let request = LogicalRequest::ScoreVariants {
            pairs: vec![chr22()],
            scorers: vec![center(501)],
        };
        let plan = plan(&request, &selection(&[]), &ServiceLimits::default()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.chunks[0].scorers, 0..1);
        assert_eq!(plan.chunks[0].payload.selection().requested_outputs, vec![OutputType::RnaSeq]);
    }

    #[test]
    fn test_scorer_overflow_batches() {
        let scorers: Vec<VariantScorer> = (0..25).map(|_| center(501)).collect();
        let request = LogicalRequest::ScoreVariants {
            pairs: vec![chr22()],
            scorers,
        };
        let plan = plan(&request, &selection(&[]), &ServiceLimits::default()).unwrap();
        let ranges: Vec<Range<usize>> = plan.chunks.iter().map(|c| c.scorers.clone()).collect();
        assert_eq!(ranges, vec![0..20, 20..25]);
        assert_eq!(plan.chunks_by_group(), vec![vec![0, 1]]);
    }

    #[test]
    fn test_unsupported_width() {
        let request = LogicalRequest::Intervals {
            intervals: vec![Interval::new("chr1", 0, 10_000).unwrap()],
        };
        assert_eq!(
            plan(&request, &selection(&[OutputType::Dnase]), &ServiceLimits::default()),
            Err(RequestError::UnsupportedSequenceLength(10_000))
        );
    }

    #[test]
    fn test_selection_checks() {
        let request = LogicalRequest::Intervals {
            intervals: vec![Interval::new("chr1", 0, 2048).unwrap()],
        };
        let limits = ServiceLimits::default();
        assert_eq!(plan(&request, &selection(&[]), &limits), Err(RequestError::NoOutputs));

        let mut bad = selection(&[OutputType::Dnase]);
        bad.ontology_terms = vec!["liver".to_string()];
        assert_eq!(plan(&request, &bad, &limits), Err(RequestError::InvalidOntologyTerm("liver".to_string())));

        let mut many = selection(&[OutputType::Dnase]);
        many.ontology_terms = (0..101).map(|i| format!("CL:{:07}", i)).collect();
        assert!(matches!(plan(&request, &many, &limits), Err(RequestError::TooManyOntologyTerms { count: 101, .. })));
    }

    #[test]
    fn test_variant_outside_interval() {
        let (interval, _) = chr22();
        let request = LogicalRequest::Variants {
            pairs: vec![(interval, Variant::new("chr22", 200_000, "A", "C").unwrap())],
        };
        assert!(matches!(
            plan(&request, &selection(&[OutputType::Dnase]), &ServiceLimits::default()),
            Err(RequestError::VariantOutsideInterval { .. })
        ));
    }

    #[test]
    fn test_center_mask_window_must_fit() {
        let (interval, _) = chr22();
        let edge = Variant::new("chr22", 100_010, "A", "C").unwrap();
        let request = LogicalRequest::ScoreVariants {
            pairs: vec![(interval, edge)],
            scorers: vec![center(2_001)],
        };
        assert!(matches!(
            plan(&request, &selection(&[]), &ServiceLimits::default()),
            Err(RequestError::InvalidScorer(_))
        ));
    }

    #[test]
    fn test_ism_windows() {
        let (interval, _) = chr22();
        let window = Interval::new("chr22", 108_000, 108_025).unwrap();
        let request = LogicalRequest::ScoreIsm {
            interval,
            window,
            scorers: vec![center(501)],
        };
        let plan = plan(&request, &selection(&[]), &ServiceLimits::default()).unwrap();
        let targets: Vec<String> = plan
            .chunks
            .iter()
            .map(|c| match &c.payload {
                RequestPayload::ScoreIsm { window, .. } => format!("{}-{}", window.start(), window.end()),
                other => panic!("unexpected payload {:?}", other),
            })
            .collect();
        assert_eq!(targets, vec!["108000-108010", "108010-108020", "108020-108025"]);
    }

    #[test]
    fn test_tile_locus() {
        let locus: Interval = "chr17:16700000-20500000".parse().unwrap();
        let tiles = tile_locus(&locus, SequenceLength::Kb500).unwrap();
        assert_eq!(tiles.len(), 8);
        assert_eq!(tiles[0].start(), 16_700_000);
        assert!(tiles.last().unwrap().end() >= 20_500_000);
        assert!(tiles.windows(2).all(|w| w[0].end() == w[1].start()));
    }

    #[test]
    fn test_sequence_validation() {
        let limits = ServiceLimits::default();
        let sel = selection(&[OutputType::Dnase]);
        let ok = LogicalRequest::Sequence { sequence: "acgtn".repeat(400) + &"A".repeat(48) };
        assert!(plan(&ok, &sel, &limits).is_ok());
        let bad = LogicalRequest::Sequence { sequence: "X".repeat(2048) };
        assert!(matches!(plan(&bad, &sel, &limits), Err(RequestError::Coordinate(CoordinateError::InvalidBase('X')))));
    }

    #[test]
    fn test_curie() {
        assert!(is_ontology_curie("UBERON:0001157"));
        assert!(is_ontology_curie("EFO:0002067"));
        assert!(!is_ontology_curie("UBERON0001157"));
        assert!(!is_ontology_curie(":123"));
        assert!(!is_ontology_curie("CL: 1"));
    }
}
