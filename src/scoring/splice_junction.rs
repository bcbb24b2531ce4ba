//! Splice junction usage scores

use super::ScoringContext;
use crate::core::error::{RequestError, ScoringError, ScoringResult};
use crate::core::genome::Interval;
use crate::core::junctions::JunctionData;
use crate::core::output::{Output, OutputType};
use crate::scoring::center_mask::SUPPORTED_WIDTHS;
use crate::scoring::result::ScoreResult;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Max change in donor-normalised junction usage near the variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpliceJunctionScorer {
    /// Window around the variant selecting junctions; `None` keeps all
    pub width: Option<u64>,
}

impl SpliceJunctionScorer {
    pub fn new(width: Option<u64>) -> Self {
        Self { width }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        match self.width {
            Some(width) if !SUPPORTED_WIDTHS.contains(&width) => Err(RequestError::InvalidScorer(
                format!("splice junction width {} not in {:?}", width, SUPPORTED_WIDTHS),
            )),
            _ => Ok(()),
        }
    }

    fn window(&self, ctx: &ScoringContext<'_>, data: &JunctionData) -> ScoringResult<Interval> {
        match self.width {
            None => Ok(data.interval().clone()),
            Some(width) => Ok(ctx.variant.reference_interval().resize(width)?),
        }
    }

    pub fn score(&self, ctx: &ScoringContext<'_>, reference: &Output, alternate: &Output) -> ScoringResult<ScoreResult> {
        let missing = || ScoringError::MissingOutput(OutputType::SpliceJunctions);
        let ref_data = reference.splice_junctions.as_ref().ok_or_else(missing)?;
        let alt_data = alternate.splice_junctions.as_ref().ok_or_else(missing)?;
        if ref_data.junctions() != alt_data.junctions() || ref_data.metadata() != alt_data.metadata() {
            return Err(ScoringError::LayoutMismatch(
                "reference and alternate junction sets differ".to_string(),
            ));
        }

        // Fractions are normalised over all junctions, then windowed
        let ref_usage = ref_data.usage_fractions();
        let alt_usage = alt_data.usage_fractions();
        let window = self.window(ctx, ref_data)?;
        let keep: Vec<usize> = ref_data
            .junctions()
            .iter()
            .enumerate()
            .filter(|(_, j)| j.overlaps(&window))
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(ScoringError::EmptyRegion(format!("junctions in {}", window)));
        }

        let delta = alt_usage.select(Axis(0), &keep) - ref_usage.select(Axis(0), &keep);
        let scores = delta
            .mapv(f32::abs)
            .fold_axis(Axis(0), 0.0f32, |acc, v| acc.max(*v));

        Ok(ScoreResult {
            variant: ctx.variant.clone(),
            interval: ctx.interval.clone(),
            scorer: self.to_string(),
            output_type: OutputType::SpliceJunctions,
            genes: vec![None],
            values: scores.insert_axis(Axis(0)),
            metadata: ref_data.metadata().to_vec(),
        })
    }
}

impl fmt::Display for SpliceJunctionScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.width {
            Some(width) => write!(f, "SpliceJunction({})", width),
            None => write!(f, "SpliceJunction(all)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::genome::{Strand, Variant};
    use crate::core::track::ChannelMetadata;
    use ndarray::{array, Array2};

    fn output(values: Array2<f32>) -> Output {
        let junction = |s, e| Interval::new("chr1", s, e).unwrap().with_strand(Strand::Plus);
        let data = JunctionData::new(
            vec![junction(1_000, 2_000), junction(1_000, 3_000), junction(9_000, 9_500)],
            values,
            vec![ChannelMetadata::new("brain", Strand::Plus)],
            Interval::new("chr1", 0, 16_384).unwrap(),
        )
        .unwrap();
        Output {
            splice_junctions: Some(data),
            ..Output::default()
        }
    }

    #[test]
    fn test_max_usage_change() {
        let variant = Variant::new("chr1", 1_500, "G", "T").unwrap();
        let interval = Interval::new("chr1", 0, 16_384).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: None };
        let reference = output(array![[3.0], [1.0], [5.0]]);
        let alternate = output(array![[1.0], [3.0], [5.0]]);

        let scorer = SpliceJunctionScorer::new(Some(2_001));
        let result = scorer.score(&ctx, &reference, &alternate).unwrap();
        assert!((result.values[[0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_no_junction_in_window() {
        let variant = Variant::new("chr1", 15_000, "G", "T").unwrap();
        let interval = Interval::new("chr1", 0, 16_384).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: None };
        let values = array![[1.0], [1.0], [1.0]];
        let err = SpliceJunctionScorer::new(Some(501))
            .score(&ctx, &output(values.clone()), &output(values))
            .unwrap_err();
        assert!(matches!(err, ScoringError::EmptyRegion(_)));
    }

    #[test]
    fn test_missing_output() {
        let variant = Variant::new("chr1", 1, "G", "T").unwrap();
        let interval = Interval::new("chr1", 0, 16_384).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: None };
        let err = SpliceJunctionScorer::new(None)
            .score(&ctx, &Output::default(), &Output::default())
            .unwrap_err();
        assert_eq!(err, ScoringError::MissingOutput(OutputType::SpliceJunctions));
    }
}
