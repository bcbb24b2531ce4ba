//! Interval-anchored track container
//!
//! A [`TrackData`] binds a `[rows x channels]` array to the genomic interval
//! it covers. Every operation returns a new container whose values and
//! interval change together, so `rows * resolution == interval.width()` and
//! `metadata.len() == channels` always hold.

use crate::core::error::{CoordinateError, DecodeError, DecodeResult, TrackError, TrackResult};
use crate::core::genome::{Interval, Strand};
use crate::core::output::OutputType;
use ndarray::{s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Per-channel track description
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub name: String,
    #[serde(default)]
    pub strand: Strand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontology_curie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assay: Option<String>,
}

impl ChannelMetadata {
    pub fn new(name: impl Into<String>, strand: Strand) -> Self {
        Self {
            name: name.into(),
            strand,
            ontology_curie: None,
            assay: None,
        }
    }

    pub fn with_ontology(mut self, curie: impl Into<String>) -> Self {
        self.ontology_curie = Some(curie.into());
        self
    }

    pub fn with_assay(mut self, assay: impl Into<String>) -> Self {
        self.assay = Some(assay.into());
        self
    }
}

/// 1D prediction track(s) over an interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    values: Array2<f32>,
    interval: Interval,
    resolution: u64,
    metadata: Vec<ChannelMetadata>,
    output_type: OutputType,
}

impl TrackData {
    /// Bind values to an interval, checking the shape invariants
    pub fn new(
        values: Array2<f32>,
        interval: Interval,
        resolution: u64,
        metadata: Vec<ChannelMetadata>,
        output_type: OutputType,
    ) -> DecodeResult<Self> {
        let (rows, cols) = values.dim();
        if resolution == 0 || rows as u64 * resolution != interval.width() {
            return Err(DecodeError::ShapeMismatch {
                output: output_type,
                rows,
                cols,
                resolution,
                width: interval.width(),
            });
        }
        if metadata.len() != cols {
            return Err(DecodeError::MetadataMismatch {
                output: output_type,
                metadata: metadata.len(),
                channels: cols,
            });
        }
        Ok(Self {
            values,
            interval,
            resolution,
            metadata,
            output_type,
        })
    }

    pub fn values(&self) -> ArrayView2<'_, f32> {
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

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_channels(&self) -> usize {
        self.values.ncols()
    }

    fn aligned(&self, value: u64) -> TrackResult<u64> {
        if value % self.resolution != 0 {
            return Err(TrackError::Unaligned {
                value,
                resolution: self.resolution,
            });
        }
        Ok(value / self.resolution)
    }

    /// Rows covering `interval`: start row floored, end row ceiled
    ///
    /// `interval` must lie within the track interval.
    pub fn row_range(&self, interval: &Interval) -> TrackResult<Range<usize>> {
        if !interval.within(&self.interval) {
            return Err(CoordinateError::OutOfBounds {
                interval: interval.to_string(),
                boundary: self.interval.to_string(),
            }
            .into());
        }
        let offset_start = interval.start() - self.interval.start();
        let offset_end = interval.end() - self.interval.start();
        let start = offset_start / self.resolution;
        let end = offset_end.div_ceil(self.resolution);
        Ok(start as usize..end as usize)
    }

    /// Sub-track covering `interval`, widened to whole rows
    pub fn slice_by_interval(&self, interval: &Interval) -> TrackResult<Self> {
        let rows = self.row_range(interval)?;
        let start = self.interval.start() + rows.start as u64 * self.resolution;
        let end = self.interval.start() + rows.end as u64 * self.resolution;
        let sliced = Interval::new(self.interval.chromosome(), start, end)?
            .with_strand(self.interval.strand());
        Ok(Self {
            values: self.values.slice(s![rows, ..]).to_owned(),
            interval: sliced,
            resolution: self.resolution,
            metadata: self.metadata.clone(),
            output_type: self.output_type,
        })
    }

    /// Recenter to `width` bases, cropping or zero-padding rows
    pub fn resize(&self, width: u64) -> TrackResult<Self> {
        let new_rows = self.aligned(width)? as usize;
        let resized = self.interval.resize(width)?;
        let shift = resized.start() as i64 - self.interval.start() as i64;
        let shift_rows = self.aligned(shift.unsigned_abs())? as i64 * shift.signum();

        let mut values = Array2::<f32>::zeros((new_rows, self.num_channels()));
        // Row r of the new track is row r + shift_rows of the old one
        let old_rows = self.num_rows() as i64;
        let first = (-shift_rows).max(0);
        let last = (old_rows - shift_rows).min(new_rows as i64);
        if first < last {
            values
                .slice_mut(s![first as usize..last as usize, ..])
                .assign(&self.values.slice(s![
                    (first + shift_rows) as usize..(last + shift_rows) as usize,
                    ..
                ]));
        }

        Ok(Self {
            values,
            interval: resized,
            resolution: self.resolution,
            metadata: self.metadata.clone(),
            output_type: self.output_type,
        })
    }

    /// Keep channels at `indices`, in that order
    pub fn select_channels(&self, indices: &[usize]) -> TrackResult<Self> {
        if let Some(bad) = indices.iter().find(|&&i| i >= self.num_channels()) {
            return Err(TrackError::Incompatible(format!(
                "channel {} out of range for {} channels",
                bad,
                self.num_channels()
            )));
        }
        Ok(Self {
            values: self.values.select(Axis(1), indices),
            interval: self.interval.clone(),
            resolution: self.resolution,
            metadata: indices.iter().map(|&i| self.metadata[i].clone()).collect(),
            output_type: self.output_type,
        })
    }

    /// Keep channels whose metadata satisfies `keep`
    pub fn filter_channels<F>(&self, keep: F) -> Self
    where
        F: Fn(&ChannelMetadata) -> bool,
    {
        let indices: Vec<usize> = self
            .metadata
            .iter()
            .enumerate()
            .filter(|(_, m)| keep(m))
            .map(|(i, _)| i)
            .collect();
        Self {
            values: self.values.select(Axis(1), &indices),
            interval: self.interval.clone(),
            resolution: self.resolution,
            metadata: indices.iter().map(|&i| self.metadata[i].clone()).collect(),
            output_type: self.output_type,
        }
    }

    /// Keep channels annotated with one of `curies`
    pub fn filter_by_ontology(&self, curies: &[String]) -> Self {
        self.filter_channels(|m| {
            m.ontology_curie
                .as_ref()
                .is_some_and(|c| curies.iter().any(|q| q == c))
        })
    }

    /// Keep channels on `strand` (unstranded channels always kept)
    pub fn filter_by_strand(&self, strand: Strand) -> Self {
        self.filter_channels(|m| m.strand.compatible_with(strand))
    }

    /// Mean value per channel
    pub fn channel_means(&self) -> Vec<f32> {
        match self.values.mean_axis(Axis(0)) {
            Some(means) => means.to_vec(),
            None => vec![f32::NAN; self.num_channels()],
        }
    }

    /// Whether two tracks have identical layout (interval, resolution, channels)
    pub fn same_layout(&self, other: &TrackData) -> bool {
        self.interval == other.interval
            && self.resolution == other.resolution
            && self.output_type == other.output_type
            && self.metadata == other.metadata
    }

    /// Join contiguous parts of the same track into one
    pub fn concat(parts: &[TrackData]) -> TrackResult<Self> {
        let first = parts.first().ok_or(TrackError::Empty)?;
        for pair in parts.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.output_type != b.output_type
                || a.resolution != b.resolution
                || a.metadata != b.metadata
            {
                return Err(TrackError::Incompatible(format!(
                    "{} and {} differ in type, resolution or channels",
                    a.interval, b.interval
                )));
            }
            if a.interval.chromosome() != b.interval.chromosome() || a.interval.end() != b.interval.start() {
                return Err(TrackError::Incompatible(format!(
                    "{} and {} are not contiguous",
                    a.interval, b.interval
                )));
            }
        }

        let views: Vec<ArrayView2<'_, f32>> = parts.iter().map(|p| p.values.view()).collect();
        let values = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| TrackError::Incompatible(e.to_string()))?;
        let last = &parts[parts.len() - 1];
        let interval = Interval::new(first.interval.chromosome(), first.interval.start(), last.interval.end())?
            .with_strand(first.interval.strand());

        Ok(Self {
            values,
            interval,
            resolution: first.resolution,
            metadata: first.metadata.clone(),
            output_type: first.output_type,
        })
    }
}
