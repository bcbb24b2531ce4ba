//! Splice junction predictions

use crate::core::error::{DecodeError, DecodeResult};
use crate::core::genome::{Interval, Strand};
use crate::core::output::OutputType;
use crate::core::track::ChannelMetadata;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Predicted junction counts `[junctions x channels]` inside an interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionData {
    junctions: Vec<Interval>,
    values: Array2<f32>,
    metadata: Vec<ChannelMetadata>,
    interval: Interval,
}

impl JunctionData {
    pub fn new(
        junctions: Vec<Interval>,
        values: Array2<f32>,
        metadata: Vec<ChannelMetadata>,
        interval: Interval,
    ) -> DecodeResult<Self> {
        let (rows, cols) = values.dim();
        if rows != junctions.len() {
            return Err(DecodeError::ValueCount {
                output: OutputType::SpliceJunctions,
                expected: junctions.len() * cols,
                found: rows * cols,
            });
        }
        if metadata.len() != cols {
            return Err(DecodeError::MetadataMismatch {
                output: OutputType::SpliceJunctions,
                metadata: metadata.len(),
                channels: cols,
            });
        }
        if let Some(stray) = junctions.iter().find(|j| !j.within(&interval)) {
            return Err(DecodeError::IntervalMismatch {
                output: OutputType::SpliceJunctions,
                expected: interval.to_string(),
                found: stray.to_string(),
            });
        }
        Ok(Self {
            junctions,
            values,
            metadata,
            interval,
        })
    }

    pub fn junctions(&self) -> &[Interval] {
        &self.junctions
    }

    pub fn values(&self) -> ArrayView2<'_, f32> {
        self.values.view()
    }

    pub fn metadata(&self) -> &[ChannelMetadata] {
        &self.metadata
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn num_channels(&self) -> usize {
        self.values.ncols()
    }

    /// Junctions overlapping `window`
    pub fn filter_overlapping(&self, window: &Interval) -> Self {
        let keep: Vec<usize> = self
            .junctions
            .iter()
            .enumerate()
            .filter(|(_, j)| j.overlaps(window))
            .map(|(i, _)| i)
            .collect();
        Self {
            junctions: keep.iter().map(|&i| self.junctions[i].clone()).collect(),
            values: self.values.select(Axis(0), &keep),
            metadata: self.metadata.clone(),
            interval: self.interval.clone(),
        }
    }

    /// Keep channels annotated with one of `curies`
    pub fn filter_by_ontology(&self, curies: &[String]) -> Self {
        let keep: Vec<usize> = self
            .metadata
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.ontology_curie
                    .as_ref()
                    .is_some_and(|c| curies.iter().any(|q| q == c))
            })
            .map(|(i, _)| i)
            .collect();
        Self {
            junctions: self.junctions.clone(),
            values: self.values.select(Axis(1), &keep),
            metadata: keep.iter().map(|&i| self.metadata[i].clone()).collect(),
            interval: self.interval.clone(),
        }
    }

    /// Donor site of a junction: its 5' end on the transcribed strand
    pub fn donor(junction: &Interval) -> (&str, Strand, u64) {
        let position = match junction.strand() {
            Strand::Minus => junction.end(),
            _ => junction.start(),
        };
        (junction.chromosome(), junction.strand(), position)
    }

    /// Counts normalised by the total of junctions sharing a donor site
    ///
    /// Donor groups whose total is zero yield zero fractions.
    pub fn usage_fractions(&self) -> Array2<f32> {
        let mut totals: HashMap<(&str, Strand, u64), Vec<f32>> = HashMap::new();
        for (junction, row) in self.junctions.iter().zip(self.values.rows()) {
            let sums = totals
                .entry(Self::donor(junction))
                .or_insert_with(|| vec![0.0; self.num_channels()]);
            for (sum, v) in sums.iter_mut().zip(row.iter()) {
                *sum += *v;
            }
        }

        let mut fractions = self.values.clone();
        for (junction, mut row) in self.junctions.iter().zip(fractions.rows_mut()) {
            if let Some(sums) = totals.get(&Self::donor(junction)) {
                for (v, sum) in row.iter_mut().zip(sums) {
                    *v = if *sum > 0.0 { *v / sum } else { 0.0 };
                }
            }
        }
        fractions
    }
}
