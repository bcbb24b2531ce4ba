//! Scores over a fixed window centred on the variant

use super::aggregation::AggregationType;
use super::{track_pair, ScoringContext};
use crate::core::error::{RequestError, ScoringError, ScoringResult};
use crate::core::genome::{Interval, Variant};
use crate::core::output::{Output, OutputType};
use crate::scoring::result::ScoreResult;
use ndarray::Axis;
use serde::{Deserialize, Serialize};

/// Window widths the service accepts for centre-mask scoring
pub const SUPPORTED_WIDTHS: [u64; 5] = [501, 2_001, 10_001, 100_001, 200_001];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CenterMaskScorer {
    pub requested_output: OutputType,
    /// Window width; `None` scores the whole prediction interval
    pub width: Option<u64>,
    pub aggregation: AggregationType,
}

impl CenterMaskScorer {
    pub fn new(requested_output: OutputType, width: Option<u64>, aggregation: AggregationType) -> Self {
        Self {
            requested_output,
            width,
            aggregation,
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if let Some(width) = self.width {
            if !SUPPORTED_WIDTHS.contains(&width) {
                return Err(RequestError::InvalidScorer(format!(
                    "center mask width {} not in {:?}",
                    width, SUPPORTED_WIDTHS
                )));
            }
        }
        if !self.requested_output.is_track() {
            return Err(RequestError::InvalidScorer(format!(
                "center mask cannot score {}",
                self.requested_output
            )));
        }
        Ok(())
    }

    /// Scored window: the variant's reference bases resized to `width`
    pub fn window(&self, variant: &Variant, interval: &Interval) -> ScoringResult<Interval> {
        self.window_around(&variant.reference_interval(), interval)
    }

    /// Window around a reference span, which must fit `interval`
    pub fn window_around(&self, reference: &Interval, interval: &Interval) -> ScoringResult<Interval> {
        let window = match self.width {
            None => return Ok(interval.clone()),
            Some(width) => reference.resize(width)?,
        };
        if !window.within(interval) {
            return Err(ScoringError::WindowOutOfBounds {
                window: window.to_string(),
                interval: interval.to_string(),
            });
        }
        Ok(window)
    }

    pub fn score(&self, ctx: &ScoringContext<'_>, reference: &Output, alternate: &Output) -> ScoringResult<ScoreResult> {
        let (ref_track, alt_track) = track_pair(self.requested_output, reference, alternate)?;
        let window = self.window(ctx.variant, ref_track.interval())?;
        let rows = ref_track.row_range(&window)?;
        let scores = self.aggregation.reduce(
            ref_track.values().slice(ndarray::s![rows.clone(), ..]),
            alt_track.values().slice(ndarray::s![rows, ..]),
            &window.to_string(),
        )?;
        Ok(ScoreResult {
            variant: ctx.variant.clone(),
            interval: ctx.interval.clone(),
            scorer: self.to_string(),
            output_type: self.requested_output,
            genes: vec![None],
            values: scores.insert_axis(Axis(0)),
            metadata: ref_track.metadata().to_vec(),
        })
    }
}

impl std::fmt::Display for CenterMaskScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.width {
            Some(width) => write!(f, "CenterMask({}, {}, {})", self.requested_output, width, self.aggregation),
            None => write!(f, "CenterMask({}, all, {})", self.requested_output, self.aggregation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::genome::Strand;

    fn chr22_interval() -> Interval {
        "chr22:100000-116384:+".parse().unwrap()
    }

    #[test]
    fn test_window_centred_on_snp() {
        let scorer = CenterMaskScorer::new(OutputType::RnaSeq, Some(501), AggregationType::DiffMean);
        let variant = Variant::new("chr22", 108_000, "A", "C").unwrap();
        let window = scorer.window(&variant, &chr22_interval()).unwrap();
        assert_eq!((window.start(), window.end()), (107_750, 108_251));
        assert_eq!(window.strand(), Strand::Unstranded);
    }

    #[test]
    fn test_window_must_fit() {
        let scorer = CenterMaskScorer::new(OutputType::Dnase, Some(10_001), AggregationType::L2Diff);
        let variant = Variant::new("chr22", 100_100, "A", "C").unwrap();
        assert!(matches!(
            scorer.window(&variant, &chr22_interval()),
            Err(ScoringError::WindowOutOfBounds { .. })
        ));
        let whole = CenterMaskScorer::new(OutputType::Dnase, None, AggregationType::L2Diff);
        assert_eq!(whole.window(&variant, &chr22_interval()).unwrap(), chr22_interval());
    }

    #[test]
    fn test_validate() {
        assert!(CenterMaskScorer::new(OutputType::Atac, Some(2_001), AggregationType::DiffSum).validate().is_ok());
        assert!(CenterMaskScorer::new(OutputType::Atac, Some(500), AggregationType::DiffSum).validate().is_err());
        assert!(CenterMaskScorer::new(OutputType::ContactMaps, None, AggregationType::DiffSum).validate().is_err());
    }
}
