//! In-process transport for tests and offline runs
//!
//! [`ScriptedTransport`] answers each request according to a script closure
//! that sees the request (including its attempt number), so failure
//! patterns stay deterministic. Answers come from [`SyntheticModel`], which
//! derives every value from coordinates alone.

use crate::core::dna;
use crate::core::genome::{Interval, Strand, Variant};
use crate::core::output::OutputType;
use crate::core::track::ChannelMetadata;
use crate::rpc::config::ApiKey;
use crate::rpc::message::{
    ChunkReply, ChunkRequest, OutputSelection, RawContactMap, RawIsmVariant, RawJunctions,
    RawOutput, RawTrack, RequestPayload, ResponsePayload, RpcStatus, StatusCode,
};
use crate::rpc::transport::{RpcStream, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Bases around a variant whose signal the synthetic model perturbs
pub const EFFECT_RADIUS: u64 = 256;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn hash_str(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

/// Deterministic stand-in for the remote model
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticModel;

impl SyntheticModel {
    /// Pseudo reference base at a genomic position
    pub fn reference_base(chromosome: &str, position: u64) -> u8 {
        dna::SUBSTITUTION_BASES[(splitmix64(hash_str(chromosome) ^ position) % 4) as usize]
    }

    fn value(chromosome: &str, position: u64, output_type: OutputType, channel: usize) -> f32 {
        let seed = hash_str(chromosome) ^ position.rotate_left(17) ^ ((output_type as u64) << 48) ^ channel as u64;
        (splitmix64(seed) >> 40) as f32 / (1u64 << 24) as f32
    }

    fn metadata(output_type: OutputType, selection: &OutputSelection) -> Vec<ChannelMetadata> {
        let strand = match output_type {
            OutputType::RnaSeq
            | OutputType::Cage
            | OutputType::Procap
            | OutputType::SpliceSites
            | OutputType::SpliceSiteUsage
            | OutputType::SpliceJunctions => Strand::Plus,
            _ => Strand::Unstranded,
        };
        if selection.ontology_terms.is_empty() {
            return vec![ChannelMetadata::new(format!("{} track", output_type), strand)];
        }
        selection
            .ontology_terms
            .iter()
            .map(|term| {
                ChannelMetadata::new(format!("{} {}", output_type, term), strand)
                    .with_ontology(term.clone())
                    .with_assay(output_type.as_str())
            })
            .collect()
    }

    /// Effect multiplier for a bin `[start, end)` given an optional variant
    fn effect(start: u64, end: u64, variant: Option<&Variant>) -> f32 {
        match variant {
            Some(v) => {
                let lo = v.position().saturating_sub(EFFECT_RADIUS);
                let hi = v.position() + EFFECT_RADIUS;
                if start < hi && end > lo {
                    1.0 + 0.5 * (1 + splitmix64(v.position() ^ hash_str(v.alternate_bases())) % 4) as f32
                } else {
                    1.0
                }
            }
            None => 1.0,
        }
    }

    fn track(output_type: OutputType, interval: &Interval, selection: &OutputSelection, variant: Option<&Variant>) -> RawTrack {
        let resolution = output_type.default_resolution();
        let rows = (interval.width() / resolution) as usize;
        let metadata = Self::metadata(output_type, selection);
        let cols = metadata.len();
        let mut values = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let start = interval.start() + row as u64 * resolution;
            let effect = Self::effect(start, start + resolution, variant);
            for col in 0..cols {
                values.push(Self::value(interval.chromosome(), start, output_type, col) * effect);
            }
        }
        RawTrack {
            output_type,
            interval: interval.clone(),
            resolution,
            shape: [rows, cols],
            values,
            metadata,
        }
    }

    fn junctions(interval: &Interval, selection: &OutputSelection, variant: Option<&Variant>) -> RawJunctions {
        let metadata = Self::metadata(OutputType::SpliceJunctions, selection);
        let width = interval.width();
        // Two acceptors share the first donor so usage fractions are informative
        let spans = [(width / 4, width / 2), (width / 4, width * 5 / 8), (width * 5 / 8, width * 3 / 4)];
        let mut junctions = Vec::new();
        let mut values = Vec::new();
        for (k, (from, to)) in spans.iter().enumerate() {
            let (start, end) = (interval.start() + from, interval.start() + to);
            if start >= end {
                continue;
            }
            let Ok(junction) = Interval::new(interval.chromosome(), start, end) else {
                continue;
            };
            let boost = if k == 0 { Self::effect(start, end, variant) } else { 1.0 };
            for col in 0..metadata.len() {
                values.push((1.0 + 10.0 * Self::value(interval.chromosome(), start ^ end, OutputType::SpliceJunctions, col)) * boost);
            }
            junctions.push(junction.with_strand(Strand::Plus));
        }
        RawJunctions {
            interval: interval.clone(),
            junctions,
            values,
            metadata,
        }
    }

    fn contact_map(interval: &Interval, selection: &OutputSelection, variant: Option<&Variant>) -> RawContactMap {
        let resolution = OutputType::ContactMaps.default_resolution();
        let bins = (interval.width() / resolution) as usize;
        let metadata = Self::metadata(OutputType::ContactMaps, selection);
        let channels = metadata.len();
        let variant_bin = variant
            .filter(|v| v.position() >= interval.start())
            .map(|v| ((v.position() - interval.start()) / resolution) as usize);
        let mut values = Vec::with_capacity(bins * bins * channels);
        for i in 0..bins {
            for j in 0..bins {
                let base = 1.0 / (1.0 + i.abs_diff(j) as f32);
                let bump = if variant_bin == Some(i) || variant_bin == Some(j) { 0.25 } else { 0.0 };
                for _ in 0..channels {
                    values.push(base + bump);
                }
            }
        }
        RawContactMap {
            interval: interval.clone(),
            resolution,
            shape: [bins, bins, channels],
            values,
            metadata,
        }
    }

    /// Predictions for one interval, perturbed around `variant` if given
    pub fn output(&self, interval: &Interval, selection: &OutputSelection, variant: Option<&Variant>) -> RawOutput {
        let mut output = RawOutput::default();
        for output_type in &selection.requested_outputs {
            match output_type {
                OutputType::SpliceJunctions => output.splice_junctions = Some(Self::junctions(interval, selection, variant)),
                OutputType::ContactMaps => output.contact_maps = Some(Self::contact_map(interval, selection, variant)),
                track => output.tracks.push(Self::track(*track, interval, selection, variant)),
            }
        }
        output
    }

    /// Full response payload for a request
    pub fn respond(&self, payload: &RequestPayload) -> Result<ResponsePayload, RpcStatus> {
        let target = payload
            .target_interval()
            .map_err(|e| RpcStatus::new(StatusCode::InvalidArgument, e.to_string()))?;
        let selection = payload.selection();
        Ok(match payload {
            RequestPayload::PredictSequence { .. } | RequestPayload::PredictInterval { .. } => ResponsePayload::Output {
                output: self.output(&target, selection, None),
            },
            RequestPayload::PredictVariant { variant, .. } | RequestPayload::ScoreVariant { variant, .. } => {
                ResponsePayload::VariantOutput {
                    reference: self.output(&target, selection, None),
                    alternate: self.output(&target, selection, Some(variant)),
                }
            }
            RequestPayload::ScoreIsm { window, .. } => {
                let mut variants = Vec::new();
                for position in window.start()..window.end() {
                    let reference = Self::reference_base(window.chromosome(), position);
                    for alt in dna::substitutions(reference) {
                        let variant = Variant::new(
                            window.chromosome(),
                            position,
                            &(reference as char).to_string(),
                            &(alt as char).to_string(),
                        )
                        .map_err(|e| RpcStatus::new(StatusCode::Internal, e.to_string()))?;
                        let alternate = self.output(&target, selection, Some(&variant));
                        variants.push(RawIsmVariant { variant, alternate });
                    }
                }
                ResponsePayload::IsmOutputs {
                    reference: self.output(&target, selection, None),
                    variants,
                }
            }
        })
    }
}

/// What the fake service does with one request
#[derive(Debug, Clone)]
pub enum Script {
    /// Reply with the synthetic model's answer
    Answer,
    /// Reply with an error status
    Fail(RpcStatus),
    /// Send this exact reply
    Reply(ChunkReply),
    /// Never reply
    Silent,
    /// Close the stream without replying
    CloseStream,
    /// Run the inner script after a delay; only replies can be delayed
    After(Duration, Box<Script>),
}

impl Script {
    pub fn answer_after(delay: Duration) -> Self {
        Script::After(delay, Box::new(Script::Answer))
    }

    pub fn after(delay: Duration, script: Script) -> Self {
        Script::After(delay, Box::new(script))
    }

    /// Reply this script produces for `request`, if any
    fn reply(self, request: &ChunkRequest, model: &SyntheticModel) -> Option<ChunkReply> {
        match self {
            Script::Answer => Some(match model.respond(&request.payload) {
                Ok(payload) => ChunkReply::ok(request, payload),
                Err(status) => ChunkReply::err(request, status),
            }),
            Script::Fail(status) => Some(ChunkReply::err(request, status)),
            Script::Reply(reply) => Some(reply),
            Script::After(_, inner) => (*inner).reply(request, model),
            Script::Silent | Script::CloseStream => None,
        }
    }
}

type Responder = dyn Fn(&ChunkRequest) -> Script + Send + Sync;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Counters {
    streams: AtomicUsize,
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
}

impl Counters {
    fn begin(&self) {
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_outstanding.fetch_max(now, Ordering::SeqCst);
    }

    fn end(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport whose behaviour is driven by a script closure
pub struct ScriptedTransport {
    model: SyntheticModel,
    responder: Arc<Responder>,
    open_failures: Mutex<VecDeque<RpcStatus>>,
    requests: Arc<Mutex<Vec<ChunkRequest>>>,
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChunkRequest) -> Script + Send + Sync + 'static,
    {
        Self {
            model: SyntheticModel,
            responder: Arc::new(responder),
            open_failures: Mutex::new(VecDeque::new()),
            requests: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Transport that answers every request
    pub fn healthy() -> Self {
        Self::new(|_| Script::Answer)
    }

    /// Fail the next `open_stream` calls with these statuses, in order
    pub fn with_open_failures(self, failures: Vec<RpcStatus>) -> Self {
        *lock(&self.open_failures) = failures.into();
        self
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<ChunkRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn stream_count(&self) -> usize {
        self.counters.streams.load(Ordering::SeqCst)
    }

    /// Highest number of requests received but not yet answered
    pub fn peak_outstanding(&self) -> usize {
        self.counters.peak_outstanding.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open_stream(&self, _credential: &ApiKey) -> Result<RpcStream, RpcStatus> {
        if let Some(status) = lock(&self.open_failures).pop_front() {
            return Err(status);
        }
        self.counters.streams.fetch_add(1, Ordering::SeqCst);

        let (stream, mut requests, replies) = RpcStream::channel();
        let model = self.model;
        let responder = Arc::clone(&self.responder);
        let log = Arc::clone(&self.requests);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                lock(&log).push(request.clone());
                counters.begin();
                match responder(&request) {
                    Script::CloseStream => {
                        counters.end();
                        break;
                    }
                    Script::Silent => {}
                    Script::After(delay, inner) => {
                        let replies = replies.clone();
                        let counters = Arc::clone(&counters);
                        let reply = (*inner).reply(&request, &model);
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            if let Some(reply) = reply {
                                counters.end();
                                let _ = replies.send(reply).await;
                            }
                        });
                    }
                    script => {
                        if let Some(reply) = script.reply(&request, &model) {
                            counters.end();
                            let _ = replies.send(reply).await;
                        }
                    }
                }
            }
        });
        Ok(stream)
    }
}
