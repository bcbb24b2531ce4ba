//! Response decoding
//!
//! Converts raw payloads into typed containers. Every declared shape is
//! checked against the chunk's target interval before any array is built.

use crate::core::contact_map::ContactMapData;
use crate::core::dna;
use crate::core::error::{DecodeError, DecodeResult};
use crate::core::genome::{Interval, Variant};
use crate::core::junctions::JunctionData;
use crate::core::output::{Output, OutputType, VariantOutput};
use crate::core::track::TrackData;
use crate::rpc::chunker::PlannedChunk;
use crate::rpc::message::{
    ChunkResponse, RawContactMap, RawJunctions, RawOutput, RawTrack, RequestPayload,
    ResponsePayload, PROTOCOL_VERSION,
};
use ndarray::{Array2, Array3};
use std::collections::{HashMap, HashSet};

/// Typed result of one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedChunk {
    Output(Output),
    Variant(VariantOutput),
    Ism {
        reference: Output,
        variants: Vec<(Variant, Output)>,
    },
}

fn same_coordinates(a: &Interval, b: &Interval) -> bool {
    a.chromosome() == b.chromosome() && a.start() == b.start() && a.end() == b.end()
}

fn check_interval(output: OutputType, found: &Interval, target: &Interval) -> DecodeResult<()> {
    if !same_coordinates(found, target) {
        return Err(DecodeError::IntervalMismatch {
            output,
            expected: target.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

/// Product of declared dimensions, failing instead of overflowing
fn element_count(output: OutputType, shape: &[usize]) -> DecodeResult<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| DecodeError::ShapeOverflow {
            output,
            shape: shape.to_vec(),
        })
}

/// Decode one 1D track; the result carries the target's strand
pub fn decode_track(raw: RawTrack, target: &Interval) -> DecodeResult<TrackData> {
    let output = raw.output_type;
    check_interval(output, &raw.interval, target)?;
    let [rows, cols] = raw.shape;
    let expected = element_count(output, &raw.shape)?;
    if expected != raw.values.len() {
        return Err(DecodeError::ValueCount {
            output,
            expected,
            found: raw.values.len(),
        });
    }
    let covered = (rows as u64).checked_mul(raw.resolution);
    if raw.resolution == 0 || covered != Some(target.width()) {
        return Err(DecodeError::ShapeMismatch {
            output,
            rows,
            cols,
            resolution: raw.resolution,
            width: target.width(),
        });
    }
    let values = Array2::from_shape_vec((rows, cols), raw.values).map_err(|_| DecodeError::ValueCount {
        output,
        expected,
        found: 0,
    })?;
    TrackData::new(values, target.clone(), raw.resolution, raw.metadata, output)
}

pub fn decode_junctions(raw: RawJunctions, target: &Interval) -> DecodeResult<JunctionData> {
    let output = OutputType::SpliceJunctions;
    check_interval(output, &raw.interval, target)?;
    let rows = raw.junctions.len();
    let cols = raw.metadata.len();
    let expected = element_count(output, &[rows, cols])?;
    if expected != raw.values.len() {
        return Err(DecodeError::ValueCount {
            output,
            expected,
            found: raw.values.len(),
        });
    }
    let values = Array2::from_shape_vec((rows, cols), raw.values).map_err(|_| DecodeError::ValueCount {
        output,
        expected,
        found: 0,
    })?;
    JunctionData::new(raw.junctions, values, raw.metadata, target.clone())
}

pub fn decode_contact_map(raw: RawContactMap, target: &Interval) -> DecodeResult<ContactMapData> {
    let output = OutputType::ContactMaps;
    check_interval(output, &raw.interval, target)?;
    let [rows, cols, channels] = raw.shape;
    let expected = element_count(output, &raw.shape)?;
    if expected != raw.values.len() {
        return Err(DecodeError::ValueCount {
            output,
            expected,
            found: raw.values.len(),
        });
    }
    let values = Array3::from_shape_vec((rows, cols, channels), raw.values).map_err(|_| {
        DecodeError::ValueCount {
            output,
            expected,
            found: 0,
        }
    })?;
    ContactMapData::new(values, target.clone(), raw.resolution, raw.metadata)
}

/// Decode all modalities and check every requested one is present
///
/// Modalities that were not requested are dropped.
pub fn decode_output(raw: RawOutput, target: &Interval, requested: &[OutputType]) -> DecodeResult<Output> {
    let mut output = Output::default();
    for track in raw.tracks {
        let output_type = track.output_type;
        if !output_type.is_track() {
            return Err(DecodeError::UnexpectedPayload(format!(
                "{} sent as a 1D track",
                output_type
            )));
        }
        if !requested.contains(&output_type) {
            log::debug!("Dropping unrequested {} track", output_type);
            continue;
        }
        if output.tracks.contains_key(&output_type) {
            return Err(DecodeError::UnexpectedPayload(format!(
                "duplicate {} track",
                output_type
            )));
        }
        output.tracks.insert(output_type, decode_track(track, target)?);
    }
    if requested.contains(&OutputType::SpliceJunctions) {
        if let Some(raw) = raw.splice_junctions {
            output.splice_junctions = Some(decode_junctions(raw, target)?);
        }
    }
    if requested.contains(&OutputType::ContactMaps) {
        if let Some(raw) = raw.contact_maps {
            output.contact_maps = Some(decode_contact_map(raw, target)?);
        }
    }

    if let Some(missing) = requested.iter().find(|ot| !output.contains(**ot)) {
        return Err(DecodeError::MissingOutput(*missing));
    }
    Ok(output)
}

/// Every returned variant is a distinct substitution inside `window`, and
/// every position of the window carries all three alternates
fn check_ism_variants(variants: &[(Variant, Output)], window: &Interval) -> DecodeResult<()> {
    let expected = window.width() as usize * (dna::SUBSTITUTION_BASES.len() - 1);
    if variants.len() != expected {
        return Err(DecodeError::IncompleteMutagenesis {
            window: window.to_string(),
            expected,
            found: variants.len(),
        });
    }
    let mut seen = HashSet::new();
    let mut reference_at = HashMap::new();
    for (variant, _) in variants {
        let alternate = variant.alternate_bases().as_bytes();
        if !variant.is_snv() || !variant.is_within(window) || !dna::SUBSTITUTION_BASES.contains(&alternate[0]) {
            return Err(DecodeError::UnexpectedPayload(format!(
                "{} is not a substitution inside {}",
                variant, window
            )));
        }
        let reference = reference_at
            .entry(variant.position())
            .or_insert_with(|| variant.reference_bases().to_string());
        if reference.as_str() != variant.reference_bases() {
            return Err(DecodeError::UnexpectedPayload(format!(
                "{} disagrees on the reference base {}",
                variant, reference
            )));
        }
        if !seen.insert((variant.position(), variant.alternate_bases().to_string())) {
            return Err(DecodeError::UnexpectedPayload(format!("duplicate {}", variant)));
        }
    }
    Ok(())
}

/// Decode a successful chunk response against the chunk that produced it
pub fn decode_response(response: ChunkResponse, chunk: &PlannedChunk) -> DecodeResult<DecodedChunk> {
    if response.schema_version != PROTOCOL_VERSION {
        return Err(DecodeError::IncompatibleSchema {
            expected: PROTOCOL_VERSION,
            found: response.schema_version,
        });
    }
    let requested = &chunk.payload.selection().requested_outputs;
    let target = &chunk.target;

    match (&chunk.payload, response.payload) {
        (
            RequestPayload::PredictSequence { .. } | RequestPayload::PredictInterval { .. },
            ResponsePayload::Output { output },
        ) => Ok(DecodedChunk::Output(decode_output(output, target, requested)?)),
        (
            RequestPayload::PredictVariant { .. } | RequestPayload::ScoreVariant { .. },
            ResponsePayload::VariantOutput { reference, alternate },
        ) => Ok(DecodedChunk::Variant(VariantOutput {
            reference: decode_output(reference, target, requested)?,
            alternate: decode_output(alternate, target, requested)?,
        })),
        (RequestPayload::ScoreIsm { window, .. }, ResponsePayload::IsmOutputs { reference, variants }) => {
            let reference = decode_output(reference, target, requested)?;
            let variants = variants
                .into_iter()
                .map(|v| Ok((v.variant, decode_output(v.alternate, target, requested)?)))
                .collect::<DecodeResult<Vec<_>>>()?;
            check_ism_variants(&variants, window)?;
            Ok(DecodedChunk::Ism { reference, variants })
        }
        (_, payload) => Err(DecodeError::UnexpectedPayload(format!(
            "{} response to a {} request",
            response_kind(&payload),
            request_kind(&chunk.payload)
        ))),
    }
}

fn request_kind(payload: &RequestPayload) -> &'static str {
    match payload {
        RequestPayload::PredictSequence { .. } => "predict_sequence",
        RequestPayload::PredictInterval { .. } => "predict_interval",
        RequestPayload::PredictVariant { .. } => "predict_variant",
        RequestPayload::ScoreVariant { .. } => "score_variant",
        RequestPayload::ScoreIsm { .. } => "score_ism",
    }
}

fn response_kind(payload: &ResponsePayload) -> &'static str {
    match payload {
        ResponsePayload::Output { .. } => "output",
        ResponsePayload::VariantOutput { .. } => "variant_output",
        ResponsePayload::IsmOutputs { .. } => "ism_outputs",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::genome::Strand;
    use crate::core::track::ChannelMetadata;

    fn target() -> Interval {
        Interval::new("chr1", 0, 2048).unwrap().with_strand(Strand::Plus)
    }

    fn raw_track(output_type: OutputType, resolution: u64) -> RawTrack {
        let rows = (2048 / resolution) as usize;
        RawTrack {
            output_type,
            interval: Interval::new("chr1", 0, 2048).unwrap(),
            resolution,
            shape: [rows, 2],
            values: vec![0.5; rows * 2],
            metadata: vec![
                ChannelMetadata::new("a", Strand::Plus),
                ChannelMetadata::new("b", Strand::Minus),
            ],
        }
    }

    #[test]
    fn test_decode_track_keeps_target_strand() {
        let track = decode_track(raw_track(OutputType::ChipTf, 128), &target()).unwrap();
        assert_eq!(track.num_rows(), 16);
        assert_eq!(track.interval().strand(), Strand::Plus);
    }

    #[test]
    fn test_shape_mismatch() {
        let mut raw = raw_track(OutputType::Dnase, 1);
        raw.shape = [2000, 2];
        raw.values.truncate(4000);
        assert!(matches!(
            decode_track(raw, &target()),
            Err(DecodeError::ShapeMismatch { rows: 2000, .. })
        ));
    }

    #[test]
    fn test_value_count_mismatch() {
        let mut raw = raw_track(OutputType::Dnase, 1);
        raw.values.pop();
        assert!(matches!(decode_track(raw, &target()), Err(DecodeError::ValueCount { .. })));
    }

    #[test]
    fn test_metadata_mismatch() {
        let mut raw = raw_track(OutputType::Dnase, 1);
        raw.metadata.pop();
        assert!(matches!(decode_track(raw, &target()), Err(DecodeError::MetadataMismatch { .. })));
    }

    #[test]
    fn test_interval_mismatch() {
        let mut raw = raw_track(OutputType::Dnase, 1);
        raw.interval = Interval::new("chr2", 0, 2048).unwrap();
        assert!(matches!(decode_track(raw, &target()), Err(DecodeError::IntervalMismatch { .. })));
    }

    #[test]
    fn test_missing_and_unrequested_outputs() {
        let raw = RawOutput {
            tracks: vec![raw_track(OutputType::Dnase, 1), raw_track(OutputType::Atac, 1)],
            ..RawOutput::default()
        };
        let output = decode_output(raw.clone(), &target(), &[OutputType::Dnase]).unwrap();
        assert_eq!(output.output_types(), vec![OutputType::Dnase]);
        assert_eq!(
            decode_output(raw, &target(), &[OutputType::Dnase, OutputType::RnaSeq]),
            Err(DecodeError::MissingOutput(OutputType::RnaSeq))
        );
    }

    #[test]
    fn test_duplicate_track() {
        let raw = RawOutput {
            tracks: vec![raw_track(OutputType::Dnase, 1), raw_track(OutputType::Dnase, 1)],
            ..RawOutput::default()
        };
        assert!(matches!(
            decode_output(raw, &target(), &[OutputType::Dnase]),
            Err(DecodeError::UnexpectedPayload(_))
        ));
    }

    #[test]
    fn test_overflowing_shape_is_an_error() {
        let mut raw = raw_track(OutputType::Dnase, 1);
        raw.shape = [usize::MAX / 2 + 1, 2];
        assert!(matches!(decode_track(raw, &target()), Err(DecodeError::ShapeOverflow { .. })));

        let raw = RawContactMap {
            interval: Interval::new("chr1", 0, 2048).unwrap(),
            resolution: 2048,
            shape: [usize::MAX, usize::MAX, 2],
            values: vec![],
            metadata: vec![],
        };
        assert!(matches!(decode_contact_map(raw, &target()), Err(DecodeError::ShapeOverflow { .. })));
    }

    fn substitutions(window: &Interval) -> Vec<(Variant, Output)> {
        (window.start()..window.end())
            .flat_map(|pos| {
                ["C", "G", "T"]
                    .into_iter()
                    .map(move |alt| (Variant::new("chr1", pos, "A", alt).unwrap(), Output::default()))
            })
            .collect()
    }

    #[test]
    fn test_ism_requires_every_substitution() {
        let window = Interval::new("chr1", 100, 104).unwrap();
        let full = substitutions(&window);
        assert!(check_ism_variants(&full, &window).is_ok());

        let mut partial = full.clone();
        partial.pop();
        assert_eq!(
            check_ism_variants(&partial, &window),
            Err(DecodeError::IncompleteMutagenesis {
                window: window.to_string(),
                expected: 12,
                found: 11,
            })
        );
        assert!(matches!(
            check_ism_variants(&[], &window),
            Err(DecodeError::IncompleteMutagenesis { found: 0, .. })
        ));

        // Right count, but one position listed twice with another reference
        let mut skewed = full;
        skewed[11] = (Variant::new("chr1", 100, "C", "A").unwrap(), Output::default());
        assert!(matches!(check_ism_variants(&skewed, &window), Err(DecodeError::UnexpectedPayload(_))));
    }

    #[test]
    fn test_contact_map_shape() {
        let raw = RawContactMap {
            interval: Interval::new("chr1", 0, 2048).unwrap(),
            resolution: 2048,
            shape: [1, 1, 1],
            values: vec![0.1],
            metadata: vec![ChannelMetadata::new("HFF", Strand::Unstranded)],
        };
        assert!(decode_contact_map(raw.clone(), &target()).is_ok());
        let mut bad = raw;
        bad.values.push(0.2);
        assert!(matches!(decode_contact_map(bad, &target()), Err(DecodeError::ValueCount { .. })));
    }
}
