//! Gene-centred scores over exon or gene-body masks
//!
//! One score row per gene overlapping the prediction interval. Channels on
//! the strand opposite to the gene are reported as NaN.

use super::{track_pair, ScoringContext};
use crate::core::annotation::GeneAnnotation;
use crate::core::error::{RequestError, ScoringError, ScoringResult};
use crate::core::genome::Interval;
use crate::core::output::{Output, OutputType};
use crate::core::track::TrackData;
use crate::scoring::result::ScoreResult;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Pseudocount added before taking log fold changes
const LFC_PSEUDOCOUNT: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneMaskMode {
    /// log2((alt + c) / (ref + c)) of the exon means
    LogFoldChange,
    /// max(mean(alt), mean(ref)) over exons
    ActiveRegion,
    /// max |alt - ref| over the gene body
    Splicing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneMaskScorer {
    pub requested_output: OutputType,
    pub mode: GeneMaskMode,
}

impl GeneMaskScorer {
    pub fn new(requested_output: OutputType, mode: GeneMaskMode) -> Self {
        Self {
            requested_output,
            mode,
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        let splice_output = matches!(
            self.requested_output,
            OutputType::SpliceSites | OutputType::SpliceSiteUsage
        );
        match self.mode {
            GeneMaskMode::Splicing if !splice_output => Err(RequestError::InvalidScorer(format!(
                "splicing gene mask needs SPLICE_SITES or SPLICE_SITE_USAGE, got {}",
                self.requested_output
            ))),
            _ if !self.requested_output.is_track() => Err(RequestError::InvalidScorer(format!(
                "gene mask cannot score {}",
                self.requested_output
            ))),
            _ => Ok(()),
        }
    }

    /// Regions retained for `gene` inside `interval`
    fn mask(&self, gene: &GeneAnnotation, interval: &Interval) -> Vec<Interval> {
        match self.mode {
            GeneMaskMode::Splicing => gene.body_within(interval).into_iter().collect(),
            GeneMaskMode::LogFoldChange | GeneMaskMode::ActiveRegion => {
                gene.exon_union_within(interval)
            }
        }
    }

    fn mask_rows(track: &TrackData, mask: &[Interval]) -> ScoringResult<Vec<usize>> {
        let mut rows = BTreeSet::new();
        for region in mask {
            rows.extend(track.row_range(region)?);
        }
        Ok(rows.into_iter().collect())
    }

    fn reduce(&self, reference: Array2<f32>, alternate: Array2<f32>, region: &str) -> ScoringResult<Array1<f32>> {
        if reference.nrows() == 0 {
            return Err(ScoringError::EmptyRegion(region.to_string()));
        }
        let scores = match self.mode {
            GeneMaskMode::LogFoldChange => {
                let (ref_mean, alt_mean) = (mean_rows(&reference), mean_rows(&alternate));
                ndarray::Zip::from(&alt_mean)
                    .and(&ref_mean)
                    .map_collect(|a, r| ((a + LFC_PSEUDOCOUNT) / (r + LFC_PSEUDOCOUNT)).log2())
            }
            GeneMaskMode::ActiveRegion => {
                let (ref_mean, alt_mean) = (mean_rows(&reference), mean_rows(&alternate));
                ndarray::Zip::from(&alt_mean).and(&ref_mean).map_collect(|a, r| a.max(*r))
            }
            GeneMaskMode::Splicing => (alternate - reference)
                .mapv(f32::abs)
                .fold_axis(Axis(0), 0.0f32, |acc, v| acc.max(*v)),
        };
        Ok(scores)
    }

    pub fn score(&self, ctx: &ScoringContext<'_>, reference: &Output, alternate: &Output) -> ScoringResult<ScoreResult> {
        let (ref_track, alt_track) = track_pair(self.requested_output, reference, alternate)?;
        let interval = ref_track.interval();
        let genes = ctx
            .genes
            .map(|index| index.genes_overlapping(interval))
            .unwrap_or_default();

        let channels = ref_track.num_channels();
        let mut labels = Vec::with_capacity(genes.len());
        let mut values = Array2::<f32>::zeros((0, channels));
        for gene in genes {
            let mask = self.mask(gene, interval);
            if mask.is_empty() {
                log::debug!("{}: no {:?} mask for {} in {}", self, self.mode, gene.label(), interval);
                continue;
            }
            let rows = Self::mask_rows(ref_track, &mask)?;
            let mut scores = self.reduce(
                ref_track.values().select(Axis(0), &rows),
                alt_track.values().select(Axis(0), &rows),
                gene.label(),
            )?;
            for (score, meta) in scores.iter_mut().zip(ref_track.metadata()) {
                if !meta.strand.compatible_with(gene.strand()) {
                    *score = f32::NAN;
                }
            }
            values
                .push_row(scores.view())
                .map_err(|e| ScoringError::LayoutMismatch(e.to_string()))?;
            labels.push(Some(gene.label().to_string()));
        }

        Ok(ScoreResult {
            variant: ctx.variant.clone(),
            interval: ctx.interval.clone(),
            scorer: self.to_string(),
            output_type: self.requested_output,
            genes: labels,
            values,
            metadata: ref_track.metadata().to_vec(),
        })
    }
}

fn mean_rows(values: &Array2<f32>) -> Array1<f32> {
    values.sum_axis(Axis(0)) / values.nrows() as f32
}

impl fmt::Display for GeneMaskScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            GeneMaskMode::LogFoldChange => "LOG_FOLD_CHANGE",
            GeneMaskMode::ActiveRegion => "ACTIVE",
            GeneMaskMode::Splicing => "SPLICING",
        };
        write!(f, "GeneMask({}, {})", self.requested_output, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotation::GeneIndex;
    use crate::core::genome::{Strand, Variant};
    use crate::core::track::ChannelMetadata;

    fn track(values: Array2<f32>) -> TrackData {
        track_of(OutputType::RnaSeq, values)
    }

    fn track_of(output_type: OutputType, values: Array2<f32>) -> TrackData {
        TrackData::new(
            values,
            Interval::new("chr1", 0, 10).unwrap().with_strand(Strand::Plus),
            1,
            vec![
                ChannelMetadata::new("plus", Strand::Plus),
                ChannelMetadata::new("minus", Strand::Minus),
            ],
            output_type,
        )
        .unwrap()
    }

    fn output(values: Array2<f32>) -> Output {
        let mut output = Output::default();
        output.tracks.insert(OutputType::RnaSeq, track(values));
        output
    }

    fn index() -> GeneIndex {
        GeneIndex::new(vec![GeneAnnotation {
            gene_id: "ENSG0001".to_string(),
            gene_name: Some("GENE1".to_string()),
            gene_type: None,
            interval: Interval::new("chr1", 2, 8).unwrap().with_strand(Strand::Plus),
            exons: vec![
                Interval::new("chr1", 2, 4).unwrap(),
                Interval::new("chr1", 6, 8).unwrap(),
            ],
        }])
    }

    #[test]
    fn test_log_fold_change_on_exons() {
        let reference = Array2::from_elem((10, 2), 1.0f32);
        let mut alternate = reference.clone();
        // Intron rows change but are masked out
        alternate.row_mut(4).fill(100.0);
        for r in [2, 3, 6, 7] {
            alternate.row_mut(r).fill(3.0);
        }
        let genes = index();
        let variant = Variant::new("chr1", 5, "A", "G").unwrap();
        let interval = Interval::new("chr1", 0, 10).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: Some(&genes) };

        let scorer = GeneMaskScorer::new(OutputType::RnaSeq, GeneMaskMode::LogFoldChange);
        let result = scorer.score(&ctx, &output(reference), &output(alternate)).unwrap();
        assert_eq!(result.genes, vec![Some("GENE1".to_string())]);
        let expected = ((3.0 + LFC_PSEUDOCOUNT) / (1.0 + LFC_PSEUDOCOUNT)).log2();
        assert!((result.values[[0, 0]] - expected).abs() < 1e-6);
        assert!(result.values[[0, 1]].is_nan());
    }

    #[test]
    fn test_splicing_takes_max_change_over_gene_body() {
        let reference = Array2::from_elem((10, 2), 0.5f32);
        let mut alternate = reference.clone();
        alternate[[4, 0]] = 0.9; // intron row, inside the gene body
        alternate[[6, 0]] = 0.25;
        alternate[[9, 0]] = 5.0; // outside the gene
        let sites = |values| {
            let mut output = Output::default();
            output.tracks.insert(OutputType::SpliceSites, track_of(OutputType::SpliceSites, values));
            output
        };
        let genes = index();
        let variant = Variant::new("chr1", 5, "A", "G").unwrap();
        let interval = Interval::new("chr1", 0, 10).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: Some(&genes) };

        let scorer = GeneMaskScorer::new(OutputType::SpliceSites, GeneMaskMode::Splicing);
        let result = scorer.score(&ctx, &sites(reference), &sites(alternate)).unwrap();
        assert_eq!(result.num_rows(), 1);
        assert!((result.values[[0, 0]] - 0.4).abs() < 1e-6);
        assert!(result.values[[0, 1]].is_nan());
    }

    #[test]
    fn test_no_genes_gives_empty_rows() {
        let values = Array2::from_elem((10, 2), 1.0f32);
        let variant = Variant::new("chr1", 5, "A", "G").unwrap();
        let interval = Interval::new("chr1", 0, 10).unwrap();
        let ctx = ScoringContext { interval: &interval, variant: &variant, genes: None };
        let scorer = GeneMaskScorer::new(OutputType::RnaSeq, GeneMaskMode::ActiveRegion);
        let result = scorer.score(&ctx, &output(values.clone()), &output(values)).unwrap();
        assert_eq!(result.num_rows(), 0);
        assert_eq!(result.num_channels(), 2);
    }

    #[test]
    fn test_validate_modes() {
        assert!(GeneMaskScorer::new(OutputType::SpliceSites, GeneMaskMode::Splicing).validate().is_ok());
        assert!(GeneMaskScorer::new(OutputType::RnaSeq, GeneMaskMode::Splicing).validate().is_err());
        assert!(GeneMaskScorer::new(OutputType::ContactMaps, GeneMaskMode::LogFoldChange).validate().is_err());
    }
}
