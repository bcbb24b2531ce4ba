//! Contact map scores over a square window around the variant

use super::aggregation::AggregationType;
use super::ScoringContext;
use crate::core::error::{CoordinateError, RequestError, ScoringError, ScoringResult};
use crate::core::genome::{Interval, Variant};
use crate::core::output::{Output, OutputType};
use crate::scoring::result::ScoreResult;
use ndarray::{Array2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactMapScorer {
    /// Window width in bases around the variant
    pub width: u64,
    pub aggregation: AggregationType,
}

impl ContactMapScorer {
    pub fn new(width: u64, aggregation: AggregationType) -> Self {
        Self { width, aggregation }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.width == 0 {
            return Err(RequestError::InvalidScorer(
                "contact map window must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Window of `width` bases centred on the variant, truncated at the
    /// chromosome start
    pub fn window(&self, variant: &Variant) -> ScoringResult<Interval> {
        let reference = variant.reference_interval();
        match reference.resize(self.width) {
            Ok(window) => Ok(window),
            Err(CoordinateError::NegativeStart { .. }) => {
                let shift = (reference.width() as i64 - self.width as i64).div_euclid(2);
                let end = (reference.start() as i64 + shift + self.width as i64).max(0) as u64;
                Ok(Interval::new(reference.chromosome(), 0, end)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn score(&self, ctx: &ScoringContext<'_>, reference: &Output, alternate: &Output) -> ScoringResult<ScoreResult> {
        let missing = || ScoringError::MissingOutput(OutputType::ContactMaps);
        let ref_map = reference.contact_maps.as_ref().ok_or_else(missing)?;
        let alt_map = alternate.contact_maps.as_ref().ok_or_else(missing)?;
        if ref_map.interval() != alt_map.interval() || ref_map.metadata() != alt_map.metadata() {
            return Err(ScoringError::LayoutMismatch(
                "reference and alternate contact maps differ".to_string(),
            ));
        }

        // Window is clipped to the map so edge variants still score
        let window = self.window(ctx.variant)?.clip(ref_map.interval())?;

        let scores = self.aggregation.reduce(
            flatten_pairs(ref_map.window(&window)?).view(),
            flatten_pairs(alt_map.window(&window)?).view(),
            &window.to_string(),
        )?;

        Ok(ScoreResult {
            variant: ctx.variant.clone(),
            interval: ctx.interval.clone(),
            scorer: self.to_string(),
            output_type: OutputType::ContactMaps,
            genes: vec![None],
            values: scores.insert_axis(Axis(0)),
            metadata: ref_map.metadata().to_vec(),
        })
    }
}

/// `[bins x bins x channels]` -> `[bins^2 x channels]`
fn flatten_pairs(block: ArrayView3<'_, f32>) -> Array2<f32> {
    let (rows, cols, channels) = block.dim();
    let mut flat = Array2::<f32>::zeros((rows * cols, channels));
    for ((i, j, c), v) in block.indexed_iter() {
        flat[[i * cols + j, c]] = *v;
    }
    flat
}

impl fmt::Display for ContactMapScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContactMap({}, {})", self.width, self.aggregation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contact_map::ContactMapData;
    use crate::core::genome::Strand;
    use crate::core::track::ChannelMetadata;
    use ndarray::Array3;

    fn output(values: Array3<f32>) -> Output {
        Output {
            contact_maps: Some(
                ContactMapData::new(
                    values,
                    Interval::new("chr1", 0, 16_384).unwrap(),
                    2048,
                    vec![ChannelMetadata::new("HFFc6", Strand::Unstranded)],
                )
                .unwrap(),
            ),
            ..Output::default()
        }
    }

    #[test]
    fn test_window_diff() {
        let reference = Array3::<f32>::zeros((8, 8, 1));
        let mut alternate = reference.clone();
        alternate[[3, 4, 0]] = 2.0;
        alternate[[0, 7, 0]] = 100.0; // outside the window
        let variant = Variant::new("chr1", 8_000, "A", "G").unwrap();
        let interval = Interval::new("chr1", 0, 16_384).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: None };

        let scorer = ContactMapScorer::new(4_096, AggregationType::DiffSum);
        let result = scorer.score(&ctx, &output(reference), &output(alternate)).unwrap();
        assert_eq!(result.values[[0, 0]], 2.0);
    }

    #[test]
    fn test_window_near_chromosome_start() {
        let reference = Array3::<f32>::zeros((8, 8, 1));
        let mut alternate = reference.clone();
        alternate[[7, 7, 0]] = 100.0; // bp 14336.., far from the variant
        let variant = Variant::new("chr1", 100, "A", "G").unwrap();
        let interval = Interval::new("chr1", 0, 16_384).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: None };

        let scorer = ContactMapScorer::new(8_192, AggregationType::DiffSum);
        let window = scorer.window(&variant).unwrap();
        assert_eq!((window.start(), window.end()), (0, 4_196));
        let result = scorer.score(&ctx, &output(reference.clone()), &output(alternate)).unwrap();
        assert_eq!(result.values[[0, 0]], 0.0);

        let mut near = reference.clone();
        near[[1, 2, 0]] = 3.0;
        let result = scorer.score(&ctx, &output(reference), &output(near)).unwrap();
        assert_eq!(result.values[[0, 0]], 3.0);
    }

    #[test]
    fn test_flatten_pairs() {
        let block = Array3::from_shape_fn((2, 2, 1), |(i, j, _)| (i * 2 + j) as f32);
        assert_eq!(flatten_pairs(block.view()).column(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
    }
}
