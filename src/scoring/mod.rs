//! Variant effect scoring
//!
//! Scorers are stateless values; [`VariantScorer`] closes the set and
//! dispatches with one exhaustive match. All scoring happens locally on
//! decoded reference/alternate predictions.

pub mod aggregation;
pub mod center_mask;
pub mod contact_map;
pub mod gene_mask;
pub mod result;
pub mod splice_junction;

pub use aggregation::AggregationType;
pub use center_mask::{CenterMaskScorer, SUPPORTED_WIDTHS};
pub use contact_map::ContactMapScorer;
pub use gene_mask::{GeneMaskMode, GeneMaskScorer};
pub use result::{tidy_scores, ScoreResult, TidyScore};
pub use splice_junction::SpliceJunctionScorer;

use crate::core::annotation::GeneIndex;
use crate::core::error::{RequestError, ScoringError, ScoringResult};
use crate::core::genome::{Interval, Variant};
use crate::core::output::{Output, OutputType, VariantOutput};
use crate::core::track::TrackData;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inputs shared by all scorers for one variant
#[derive(Clone, Copy)]
pub struct ScoringContext<'a> {
    pub interval: &'a Interval,
    pub variant: &'a Variant,
    pub genes: Option<&'a GeneIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariantScorer {
    CenterMask(CenterMaskScorer),
    GeneMask(GeneMaskScorer),
    SpliceJunction(SpliceJunctionScorer),
    ContactMap(ContactMapScorer),
}

impl VariantScorer {
    /// Modality the scorer reads
    pub fn requested_output(&self) -> OutputType {
        match self {
            VariantScorer::CenterMask(s) => s.requested_output,
            VariantScorer::GeneMask(s) => s.requested_output,
            VariantScorer::SpliceJunction(_) => OutputType::SpliceJunctions,
            VariantScorer::ContactMap(_) => OutputType::ContactMaps,
        }
    }

    pub fn needs_genes(&self) -> bool {
        matches!(self, VariantScorer::GeneMask(_))
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        match self {
            VariantScorer::CenterMask(s) => s.validate(),
            VariantScorer::GeneMask(s) => s.validate(),
            VariantScorer::SpliceJunction(s) => s.validate(),
            VariantScorer::ContactMap(s) => s.validate(),
        }
    }

    /// Checks that depend on where the variant sits in the interval
    pub fn validate_for(&self, variant: &Variant, interval: &Interval) -> Result<(), RequestError> {
        self.validate_at(&variant.reference_interval(), interval)
    }

    /// Same as [`validate_for`](Self::validate_for) given only the reference span
    pub fn validate_at(&self, reference: &Interval, interval: &Interval) -> Result<(), RequestError> {
        self.validate()?;
        if let VariantScorer::CenterMask(s) = self {
            s.window_around(reference, interval)
                .map_err(|e| RequestError::InvalidScorer(format!("{}: {}", s, e)))?;
        }
        Ok(())
    }

    pub fn score(&self, ctx: &ScoringContext<'_>, reference: &Output, alternate: &Output) -> ScoringResult<ScoreResult> {
        match self {
            VariantScorer::CenterMask(s) => s.score(ctx, reference, alternate),
            VariantScorer::GeneMask(s) => s.score(ctx, reference, alternate),
            VariantScorer::SpliceJunction(s) => s.score(ctx, reference, alternate),
            VariantScorer::ContactMap(s) => s.score(ctx, reference, alternate),
        }
    }
}

impl fmt::Display for VariantScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantScorer::CenterMask(s) => write!(f, "{}", s),
            VariantScorer::GeneMask(s) => write!(f, "{}", s),
            VariantScorer::SpliceJunction(s) => write!(f, "{}", s),
            VariantScorer::ContactMap(s) => write!(f, "{}", s),
        }
    }
}

impl From<CenterMaskScorer> for VariantScorer {
    fn from(s: CenterMaskScorer) -> Self {
        VariantScorer::CenterMask(s)
    }
}

impl From<GeneMaskScorer> for VariantScorer {
    fn from(s: GeneMaskScorer) -> Self {
        VariantScorer::GeneMask(s)
    }
}

impl From<SpliceJunctionScorer> for VariantScorer {
    fn from(s: SpliceJunctionScorer) -> Self {
        VariantScorer::SpliceJunction(s)
    }
}

impl From<ContactMapScorer> for VariantScorer {
    fn from(s: ContactMapScorer) -> Self {
        VariantScorer::ContactMap(s)
    }
}

/// Default scorer set covering every modality
///
/// The gene mask scorers need a gene index at scoring time.
pub fn recommended_scorers() -> Vec<VariantScorer> {
    let center = |output: OutputType, width: u64| -> VariantScorer {
        CenterMaskScorer::new(output, Some(width), AggregationType::DiffLog2Sum).into()
    };
    vec![
        center(OutputType::Atac, 501),
        center(OutputType::Dnase, 501),
        center(OutputType::ChipTf, 501),
        center(OutputType::ChipHistone, 2_001),
        center(OutputType::Cage, 501),
        center(OutputType::Procap, 501),
        GeneMaskScorer::new(OutputType::RnaSeq, GeneMaskMode::LogFoldChange).into(),
        GeneMaskScorer::new(OutputType::SpliceSites, GeneMaskMode::Splicing).into(),
        GeneMaskScorer::new(OutputType::SpliceSiteUsage, GeneMaskMode::Splicing).into(),
        SpliceJunctionScorer::new(None).into(),
        ContactMapScorer::new(1 << 20, AggregationType::L2Diff).into(),
    ]
}

/// Matching reference/alternate tracks for `output_type`
pub(crate) fn track_pair<'o>(
    output_type: OutputType,
    reference: &'o Output,
    alternate: &'o Output,
) -> ScoringResult<(&'o TrackData, &'o TrackData)> {
    let missing = || ScoringError::MissingOutput(output_type);
    let ref_track = reference.get(output_type).ok_or_else(missing)?;
    let alt_track = alternate.get(output_type).ok_or_else(missing)?;
    if !ref_track.same_layout(alt_track) {
        return Err(ScoringError::LayoutMismatch(format!(
            "{} reference {} vs alternate {}",
            output_type,
            ref_track.interval(),
            alt_track.interval()
        )));
    }
    Ok((ref_track, alt_track))
}

/// Apply every scorer to one variant's paired predictions, in scorer order
pub fn score_output(
    ctx: &ScoringContext<'_>,
    scorers: &[VariantScorer],
    output: &VariantOutput,
) -> ScoringResult<Vec<ScoreResult>> {
    scorers
        .iter()
        .map(|s| s.score(ctx, &output.reference, &output.alternate))
        .collect()
}

/// Score many variants sharing one reference prediction, in parallel
///
/// Results keep the order of `alternates`.
pub fn score_shared_reference(
    interval: &Interval,
    genes: Option<&GeneIndex>,
    scorers: &[VariantScorer],
    reference: &Output,
    alternates: &[(Variant, Output)],
) -> ScoringResult<Vec<Vec<ScoreResult>>> {
    alternates
        .par_iter()
        .map(|(variant, alternate)| {
            let ctx = ScoringContext {
                interval,
                variant,
                genes,
            };
            scorers
                .iter()
                .map(|s| s.score(&ctx, reference, alternate))
                .collect()
        })
        .collect()
}
