//! Score containers and their tidy (long) form

use crate::core::genome::{Interval, Variant};
use crate::core::output::OutputType;
use crate::core::track::ChannelMetadata;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Scores of one scorer for one variant: `[rows x channels]`
///
/// Variant-centred scorers produce one row; gene scorers one row per gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub variant: Variant,
    pub interval: Interval,
    /// Display name of the scorer that produced the values
    pub scorer: String,
    pub output_type: OutputType,
    /// Gene label per row, `None` for variant-centred rows
    pub genes: Vec<Option<String>>,
    pub values: Array2<f32>,
    pub metadata: Vec<ChannelMetadata>,
}

/// One score in long format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyScore {
    pub variant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    pub scorer: String,
    pub output_type: OutputType,
    pub gene: Option<String>,
    pub track: String,
    pub strand: String,
    pub ontology: Option<String>,
    pub score: f32,
}

impl ScoreResult {
    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_channels(&self) -> usize {
        self.values.ncols()
    }

    /// Flatten to one record per (row, channel)
    pub fn tidy(&self) -> Vec<TidyScore> {
        let variant = self.variant.to_string();
        let mut rows = Vec::with_capacity(self.values.len());
        for (gene, values) in self.genes.iter().zip(self.values.rows()) {
            for (meta, score) in self.metadata.iter().zip(values.iter()) {
                rows.push(TidyScore {
                    variant: variant.clone(),
                    variant_name: self.variant.name().map(str::to_string),
                    scorer: self.scorer.clone(),
                    output_type: self.output_type,
                    gene: gene.clone(),
                    track: meta.name.clone(),
                    strand: meta.strand.to_string(),
                    ontology: meta.ontology_curie.clone(),
                    score: *score,
                });
            }
        }
        rows
    }
}

/// Flatten per-variant score lists into one table
pub fn tidy_scores<'a, I>(results: I) -> Vec<TidyScore>
where
    I: IntoIterator<Item = &'a ScoreResult>,
{
    results.into_iter().flat_map(ScoreResult::tidy).collect()
}
