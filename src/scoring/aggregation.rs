//! Reducers turning paired reference/alternate values into one score per channel

use crate::core::error::{ScoringError, ScoringResult};
use ndarray::{Array1, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How reference and alternate rows are reduced per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationType {
    /// mean(alt) - mean(ref)
    DiffMean,
    /// sum(alt) - sum(ref)
    DiffSum,
    /// log2(1 + sum(alt)) - log2(1 + sum(ref))
    DiffSumLog2,
    /// sum(log2(1 + alt)) - sum(log2(1 + ref))
    DiffLog2Sum,
    /// ||alt - ref||_2
    L2Diff,
    /// ||ln(1 + alt) - ln(1 + ref)||_2
    L2DiffLog1p,
    /// max(mean(alt), mean(ref))
    ActiveMean,
    /// max(sum(alt), sum(ref))
    ActiveSum,
}

impl AggregationType {
    /// Whether the score carries a direction of effect
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            AggregationType::DiffMean
                | AggregationType::DiffSum
                | AggregationType::DiffSumLog2
                | AggregationType::DiffLog2Sum
        )
    }

    /// Reduce `[rows x channels]` views to one value per channel
    ///
    /// `region` names the retained region in the error raised when there
    /// are no rows.
    pub fn reduce(
        &self,
        reference: ArrayView2<'_, f32>,
        alternate: ArrayView2<'_, f32>,
        region: &str,
    ) -> ScoringResult<Array1<f32>> {
        if reference.dim() != alternate.dim() {
            return Err(ScoringError::LayoutMismatch(format!(
                "reference {:?} vs alternate {:?}",
                reference.dim(),
                alternate.dim()
            )));
        }
        if reference.nrows() == 0 {
            return Err(ScoringError::EmptyRegion(region.to_string()));
        }

        let sum = |v: ArrayView2<'_, f32>| v.sum_axis(Axis(0));
        let mean = |v: ArrayView2<'_, f32>| v.sum_axis(Axis(0)) / v.nrows() as f32;
        let log2p = |x: f32| (1.0 + x).log2();

        let scores = match self {
            AggregationType::DiffMean => mean(alternate) - mean(reference),
            AggregationType::DiffSum => sum(alternate) - sum(reference),
            AggregationType::DiffSumLog2 => {
                sum(alternate).mapv(log2p) - sum(reference).mapv(log2p)
            }
            AggregationType::DiffLog2Sum => {
                alternate.mapv(log2p).sum_axis(Axis(0)) - reference.mapv(log2p).sum_axis(Axis(0))
            }
            AggregationType::L2Diff => {
                let mut squared = Array1::<f32>::zeros(reference.ncols());
                Zip::from(reference.columns())
                    .and(alternate.columns())
                    .and(&mut squared)
                    .for_each(|r, a, out| {
                        *out = r.iter().zip(a.iter()).map(|(r, a)| (a - r).powi(2)).sum();
                    });
                squared.mapv(f32::sqrt)
            }
            AggregationType::L2DiffLog1p => {
                let diff = alternate.mapv(f32::ln_1p) - reference.mapv(f32::ln_1p);
                diff.mapv(|d| d * d).sum_axis(Axis(0)).mapv(f32::sqrt)
            }
            AggregationType::ActiveMean => {
                Zip::from(&mean(alternate)).and(&mean(reference)).map_collect(|a, r| a.max(*r))
            }
            AggregationType::ActiveSum => {
                Zip::from(&sum(alternate)).and(&sum(reference)).map_collect(|a, r| a.max(*r))
            }
        };
        Ok(scores)
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationType::DiffMean => "DIFF_MEAN",
            AggregationType::DiffSum => "DIFF_SUM",
            AggregationType::DiffSumLog2 => "DIFF_SUM_LOG2",
            AggregationType::DiffLog2Sum => "DIFF_LOG2_SUM",
            AggregationType::L2Diff => "L2_DIFF",
            AggregationType::L2DiffLog1p => "L2_DIFF_LOG1P",
            AggregationType::ActiveMean => "ACTIVE_MEAN",
            AggregationType::ActiveSum => "ACTIVE_SUM",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    const ALL: [AggregationType; 8] = [
        AggregationType::DiffMean,
        AggregationType::DiffSum,
        AggregationType::DiffSumLog2,
        AggregationType::DiffLog2Sum,
        AggregationType::L2Diff,
        AggregationType::L2DiffLog1p,
        AggregationType::ActiveMean,
        AggregationType::ActiveSum,
    ];

    #[test]
    fn test_diff_aggregations() {
        let reference = array![[1.0f32, 0.0], [3.0, 0.0]];
        let alternate = array![[2.0f32, 1.0], [6.0, 1.0]];
        let reduce = |agg: AggregationType| agg.reduce(reference.view(), alternate.view(), "test").unwrap().to_vec();

        assert_eq!(reduce(AggregationType::DiffMean), vec![2.0, 1.0]);
        assert_eq!(reduce(AggregationType::DiffSum), vec![4.0, 2.0]);
        assert_eq!(reduce(AggregationType::ActiveMean), vec![4.0, 1.0]);
        assert_eq!(reduce(AggregationType::ActiveSum), vec![8.0, 2.0]);
        assert_eq!(reduce(AggregationType::L2Diff), vec![10.0f32.sqrt(), 2.0f32.sqrt()]);
        let sum_log2 = reduce(AggregationType::DiffSumLog2);
        assert!((sum_log2[0] - (9.0f32.log2() - 5.0f32.log2())).abs() < 1e-6);
    }

    #[test]
    fn test_identical_tracks_score_zero() {
        let values = Array2::from_shape_fn((5, 3), |(r, c)| (r + c) as f32 * 0.5);
        for agg in [AggregationType::DiffMean, AggregationType::L2Diff, AggregationType::L2DiffLog1p, AggregationType::DiffLog2Sum] {
            let scores = agg.reduce(values.view(), values.view(), "test").unwrap();
            assert!(scores.iter().all(|s| *s == 0.0), "{} gave {:?}", agg, scores);
        }
    }

    #[test]
    fn test_empty_region_is_error() {
        let empty = Array2::<f32>::zeros((0, 2));
        for agg in ALL {
            let err = agg.reduce(empty.view(), empty.view(), "chr1:5-5:.").unwrap_err();
            assert_eq!(err, ScoringError::EmptyRegion("chr1:5-5:.".to_string()));
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f32>::zeros((2, 2));
        let b = Array2::<f32>::zeros((3, 2));
        assert!(matches!(
            AggregationType::DiffMean.reduce(a.view(), b.view(), "x"),
            Err(ScoringError::LayoutMismatch(_))
        ));
    }

    #[test]
    fn test_names() {
        assert_eq!(AggregationType::L2Diff.to_string(), "L2_DIFF");
        let parsed: AggregationType = serde_json::from_str("\"DIFF_MEAN\"").unwrap();
        assert_eq!(parsed, AggregationType::DiffMean);
        assert!(AggregationType::DiffMean.is_signed());
        assert!(!AggregationType::ActiveSum.is_signed());
    }
}
