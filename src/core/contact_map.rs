//! Contact map predictions

use crate::core::error::{CoordinateError, DecodeError, DecodeResult, TrackResult};
use crate::core::genome::Interval;
use crate::core::output::OutputType;
use crate::core::track::ChannelMetadata;
use ndarray::{s, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Pairwise contact predictions `[bins x bins x channels]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMapData {
    values: Array3<f32>,
    interval: Interval,
    resolution: u64,
    metadata: Vec<ChannelMetadata>,
}

impl ContactMapData {
    pub fn new(
        values: Array3<f32>,
        interval: Interval,
        resolution: u64,
        metadata: Vec<ChannelMetadata>,
    ) -> DecodeResult<Self> {
        let (rows, cols, channels) = values.dim();
        if resolution == 0 || rows != cols || rows as u64 * resolution != interval.width() {
            return Err(DecodeError::ShapeMismatch {
                output: OutputType::ContactMaps,
                rows,
                cols,
                resolution,
                width: interval.width(),
            });
        }
        if metadata.len() != channels {
            return Err(DecodeError::MetadataMismatch {
                output: OutputType::ContactMaps,
                metadata: metadata.len(),
                channels,
            });
        }
        Ok(Self {
            values,
            interval,
            resolution,
            metadata,
        })
    }

    pub fn values(&self) -> ArrayView3<'_, f32> {
        self.values.view()
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn resolution(&self) -> u64 {
        self.resolution
    }

    pub fn metadata(&self) -> &[ChannelMetadata] {
        &self.metadata
    }

    pub fn num_bins(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    /// Bins covering `window`, start floored and end ceiled
    pub fn bin_range(&self, window: &Interval) -> TrackResult<Range<usize>> {
        if !window.within(&self.interval) {
            return Err(CoordinateError::OutOfBounds {
                interval: window.to_string(),
                boundary: self.interval.to_string(),
            }
            .into());
        }
        let start = (window.start() - self.interval.start()) / self.resolution;
        let end = (window.end() - self.interval.start()).div_ceil(self.resolution);
        Ok(start as usize..end as usize)
    }

    /// Square block of bins covering `window` on both axes
    pub fn window(&self, window: &Interval) -> TrackResult<ArrayView3<'_, f32>> {
        let bins = self.bin_range(window)?;
        Ok(self.values.slice(s![bins.clone(), bins, ..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::genome::Strand;

    fn sample() -> ContactMapData {
        let values = Array3::from_shape_fn((4, 4, 1), |(i, j, _)| (i * 4 + j) as f32);
        ContactMapData::new(
            values,
            Interval::new("chr1", 0, 8192).unwrap(),
            2048,
            vec![ChannelMetadata::new("HFFc6", Strand::Unstranded)],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_square() {
        let err = ContactMapData::new(
            Array3::zeros((4, 3, 1)),
            Interval::new("chr1", 0, 8192).unwrap(),
            2048,
            vec![ChannelMetadata::new("x", Strand::Unstranded)],
        );
        assert!(matches!(err, Err(DecodeError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_window() {
        let map = sample();
        let window = map.window(&Interval::new("chr1", 2048, 4097).unwrap()).unwrap();
        assert_eq!(window.dim(), (2, 2, 1));
        assert_eq!(window[[0, 0, 0]], 5.0);
        assert_eq!(window[[1, 1, 0]], 10.0);
        assert!(map.window(&Interval::new("chr1", 8000, 9000).unwrap()).is_err());
    }
}
