//! Output modalities and per-call prediction containers

use crate::core::contact_map::ContactMapData;
use crate::core::genome::Interval;
use crate::core::junctions::JunctionData;
use crate::core::track::TrackData;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Output modality produced by the service
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputType {
    Atac,
    Cage,
    Dnase,
    RnaSeq,
    ChipHistone,
    ChipTf,
    SpliceSites,
    SpliceSiteUsage,
    SpliceJunctions,
    ContactMaps,
    Procap,
}

impl OutputType {
    pub const ALL: [OutputType; 11] = [
        OutputType::Atac,
        OutputType::Cage,
        OutputType::Dnase,
        OutputType::RnaSeq,
        OutputType::ChipHistone,
        OutputType::ChipTf,
        OutputType::SpliceSites,
        OutputType::SpliceSiteUsage,
        OutputType::SpliceJunctions,
        OutputType::ContactMaps,
        OutputType::Procap,
    ];

    /// Bases per row of the returned track
    pub fn default_resolution(&self) -> u64 {
        match self {
            OutputType::ChipHistone | OutputType::ChipTf => 128,
            OutputType::ContactMaps => 2048,
            _ => 1,
        }
    }

    /// Whether the modality is a 1D track (rows along the interval)
    pub fn is_track(&self) -> bool {
        !matches!(self, OutputType::SpliceJunctions | OutputType::ContactMaps)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Atac => "ATAC",
            OutputType::Cage => "CAGE",
            OutputType::Dnase => "DNASE",
            OutputType::RnaSeq => "RNA_SEQ",
            OutputType::ChipHistone => "CHIP_HISTONE",
            OutputType::ChipTf => "CHIP_TF",
            OutputType::SpliceSites => "SPLICE_SITES",
            OutputType::SpliceSiteUsage => "SPLICE_SITE_USAGE",
            OutputType::SpliceJunctions => "SPLICE_JUNCTIONS",
            OutputType::ContactMaps => "CONTACT_MAPS",
            OutputType::Procap => "PROCAP",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded predictions for one interval
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Output {
    pub tracks: BTreeMap<OutputType, TrackData>,
    pub splice_junctions: Option<JunctionData>,
    pub contact_maps: Option<ContactMapData>,
}

impl Output {
    /// 1D track for `output_type`, if requested
    pub fn get(&self, output_type: OutputType) -> Option<&TrackData> {
        self.tracks.get(&output_type)
    }

    pub fn atac(&self) -> Option<&TrackData> {
        self.get(OutputType::Atac)
    }

    pub fn dnase(&self) -> Option<&TrackData> {
        self.get(OutputType::Dnase)
    }

    pub fn rna_seq(&self) -> Option<&TrackData> {
        self.get(OutputType::RnaSeq)
    }

    pub fn cage(&self) -> Option<&TrackData> {
        self.get(OutputType::Cage)
    }

    /// Whether the payload holds data for `output_type`
    pub fn contains(&self, output_type: OutputType) -> bool {
        match output_type {
            OutputType::SpliceJunctions => self.splice_junctions.is_some(),
            OutputType::ContactMaps => self.contact_maps.is_some(),
            other => self.tracks.contains_key(&other),
        }
    }

    /// Modalities present, in enum order
    pub fn output_types(&self) -> Vec<OutputType> {
        OutputType::ALL
            .into_iter()
            .filter(|ot| self.contains(*ot))
            .collect()
    }

    /// Interval of the first available modality
    pub fn interval(&self) -> Option<&Interval> {
        self.tracks
            .values()
            .next()
            .map(|t| t.interval())
            .or_else(|| self.contact_maps.as_ref().map(|c| c.interval()))
            .or_else(|| self.splice_junctions.as_ref().map(|j| j.interval()))
    }
}

/// Paired reference/alternate predictions for a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOutput {
    pub reference: Output,
    pub alternate: Output,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_type_names() {
        assert_eq!(OutputType::RnaSeq.to_string(), "RNA_SEQ");
        let json = serde_json::to_string(&OutputType::ChipHistone).unwrap();
        assert_eq!(json, "\"CHIP_HISTONE\"");
        let back: OutputType = serde_json::from_str("\"SPLICE_SITE_USAGE\"").unwrap();
        assert_eq!(back, OutputType::SpliceSiteUsage);
    }

    #[test]
    fn test_resolutions() {
        assert_eq!(OutputType::RnaSeq.default_resolution(), 1);
        assert_eq!(OutputType::ChipTf.default_resolution(), 128);
        assert!(!OutputType::ContactMaps.is_track());
    }

    #[test]
    fn test_empty_output() {
        let output = Output::default();
        assert!(output.output_types().is_empty());
        assert!(output.interval().is_none());
        assert!(!output.contains(OutputType::SpliceJunctions));
    }
}
