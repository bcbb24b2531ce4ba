//! Streaming prediction client
//!
//! Every public call follows the same path: validate and plan (no network),
//! then drive the chunks over one or more streams, then decode and
//! reassemble in plan order. A call either returns every result or fails as
//! a whole.
//!
//! Within a stream a sender task forwards chunk requests while the receiver
//! loop owns all call state: the pending queue, the in-flight table (with
//! per-attempt deadlines), the retry queue and the reassembly buffer.

use crate::core::annotation::GeneIndex;
use crate::core::error::{DecodeError, PredictError, RequestError, Result};
use crate::core::genome::{Interval, SequenceLength, Variant};
use crate::core::output::{Output, OutputType, VariantOutput};
use crate::core::track::TrackData;
use crate::rpc::chunker::{self, ChunkPlan, LogicalRequest, PlannedChunk};
use crate::rpc::config::{ApiKey, ClientConfig};
use crate::rpc::decoder::{self, DecodedChunk};
use crate::rpc::message::{ChunkReply, ChunkRequest, OutputSelection, RpcStatus, StatusCode, PROTOCOL_VERSION};
use crate::rpc::reassembly::ReassemblyBuffer;
use crate::rpc::transport::{RpcStream, Transport};
use crate::scoring::{self, ScoreResult, ScoringContext, VariantScorer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Lifecycle of one logical call, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Idle,
    StreamOpen,
    Sending,
    Receiving,
    Closed,
    Failed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct CallTrace {
    operation: &'static str,
    state: CallState,
}

impl CallTrace {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            state: CallState::Idle,
        }
    }

    fn enter(&mut self, next: CallState) {
        if self.state != next {
            log::debug!("{}: {} -> {}", self.operation, self.state, next);
            self.state = next;
        }
    }
}

/// Aborts the wrapped task when dropped, so abandoning a call stops sending
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct InFlight {
    attempt: u32,
    deadline: Instant,
}

#[derive(Default)]
struct ChunkState {
    attempts: u32,
    first_dispatch: Option<Instant>,
}

/// Why a stream session ended without finishing the call
enum StreamEnd {
    /// Per-stream chunk budget used up
    Rotate,
    /// Stream closed or the sender task died
    Broken,
}

/// Mutable state of one call, shared across its streams
struct CallDriver<'a> {
    config: &'a ClientConfig,
    plan: &'a ChunkPlan,
    chunks: Vec<ChunkState>,
    pending: VecDeque<usize>,
    retries: BinaryHeap<Reverse<(Instant, usize)>>,
    in_flight: HashMap<usize, InFlight>,
    buffer: ReassemblyBuffer<DecodedChunk>,
    rng: StdRng,
    trace: CallTrace,
}

impl<'a> CallDriver<'a> {
    fn new(config: &'a ClientConfig, plan: &'a ChunkPlan, rng: StdRng, operation: &'static str) -> Self {
        Self {
            config,
            plan,
            chunks: plan.chunks.iter().map(|_| ChunkState::default()).collect(),
            pending: (0..plan.len()).collect(),
            retries: BinaryHeap::new(),
            in_flight: HashMap::new(),
            buffer: ReassemblyBuffer::new(plan.len()),
            rng,
            trace: CallTrace::new(operation),
        }
    }

    fn chunk(&self, index: usize) -> &PlannedChunk {
        &self.plan.chunks[index]
    }

    /// First chunk not yet answered, for errors not tied to one chunk
    fn first_unfinished(&self) -> usize {
        (0..self.plan.len()).find(|i| !self.buffer.contains(*i)).unwrap_or(0)
    }

    fn promote_due_retries(&mut self, now: Instant) {
        while let Some(Reverse((ready, index))) = self.retries.peek().copied() {
            if ready > now {
                break;
            }
            self.retries.pop();
            self.pending.push_back(index);
        }
    }

    /// Record a transient failure and schedule a retry if the budget allows
    fn fail_transient(&mut self, index: usize, status: RpcStatus) -> Result<()> {
        let now = Instant::now();
        let state = &self.chunks[index];
        let failed = state.attempts;
        let elapsed = state.first_dispatch.map(|t| now - t).unwrap_or_default();
        let delay = self.config.retry.backoff_delay(failed, &mut self.rng);
        if !self.config.retry.allows_retry(failed, elapsed, delay) {
            let chunk = self.chunk(index);
            return Err(PredictError::ServiceUnavailable {
                chunk_index: index,
                region: chunk.region.clone(),
                attempts: failed,
                last_status: status,
            });
        }
        log::warn!(
            "Chunk {} ({}) attempt {} failed with {}; retrying in {:?}",
            index,
            self.chunk(index).region,
            failed,
            status,
            delay
        );
        self.retries.push(Reverse((now + delay, index)));
        Ok(())
    }

    fn fail_status(&mut self, index: usize, status: RpcStatus) -> Result<()> {
        if status.code.is_auth_failure() {
            return Err(PredictError::Authentication(status.to_string()));
        }
        if self.config.retry.is_retryable(status.code) {
            return self.fail_transient(index, status);
        }
        Err(PredictError::Rejected {
            chunk_index: index,
            region: self.chunk(index).region.clone(),
            status,
        })
    }

    fn handle_reply(&mut self, reply: ChunkReply) -> Result<()> {
        let index = reply.chunk_index;
        match self.in_flight.get(&index) {
            Some(flight) if flight.attempt == reply.attempt => {}
            _ => {
                log::debug!("Ignoring stale reply for chunk {} attempt {}", index, reply.attempt);
                return Ok(());
            }
        }
        self.in_flight.remove(&index);
        match reply.result {
            Ok(response) => {
                let decoded = decoder::decode_response(response, self.chunk(index)).map_err(|source| {
                    PredictError::MalformedResponse {
                        chunk_index: index,
                        region: self.chunk(index).region.clone(),
                        source,
                    }
                })?;
                self.buffer.insert(index, decoded);
                log::debug!("Chunk {} complete ({}/{})", index, self.buffer.filled(), self.buffer.len());
                Ok(())
            }
            Err(status) => self.fail_status(index, status),
        }
    }

    /// Fail every in-flight chunk after its stream went away
    fn abandon_in_flight(&mut self, reason: &str) -> Result<()> {
        let mut lost: Vec<usize> = self.in_flight.drain().map(|(i, _)| i).collect();
        lost.sort_unstable();
        for index in lost {
            self.fail_transient(index, RpcStatus::new(StatusCode::Unavailable, reason))?;
        }
        Ok(())
    }

    fn expire_deadlines(&mut self, now: Instant) -> Result<()> {
        let mut expired: Vec<usize> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(i, _)| *i)
            .collect();
        expired.sort_unstable();
        for index in expired {
            self.in_flight.remove(&index);
            let status = RpcStatus::new(
                StatusCode::DeadlineExceeded,
                format!("no reply within {:?}", self.config.attempt_timeout()),
            );
            self.fail_transient(index, status)?;
        }
        Ok(())
    }

    fn next_wakeup(&self) -> Option<Instant> {
        let deadline = self.in_flight.values().map(|f| f.deadline).min();
        let retry = self.retries.peek().map(|Reverse((t, _))| *t);
        match (deadline, retry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drive chunks over one open stream
    async fn run_stream(&mut self, stream: RpcStream) -> Result<Option<StreamEnd>> {
        let RpcStream { requests, mut responses } = stream;
        let (dispatch, mut outbox) = mpsc::unbounded_channel::<ChunkRequest>();
        let _sender = AbortOnDrop(tokio::spawn(async move {
            while let Some(request) = outbox.recv().await {
                if requests.send(request).await.is_err() {
                    break;
                }
            }
        }));

        let mut carried: HashSet<usize> = HashSet::new();
        loop {
            let now = Instant::now();
            self.promote_due_retries(now);

            while self.in_flight.len() < self.config.max_parallel_chunks {
                let Some(&index) = self.pending.front() else { break };
                if !carried.contains(&index) && carried.len() >= self.config.max_chunks_per_stream {
                    break;
                }
                self.pending.pop_front();
                self.trace.enter(CallState::Sending);
                let state = &mut self.chunks[index];
                state.attempts += 1;
                state.first_dispatch.get_or_insert(now);
                let attempt = state.attempts;
                let request = ChunkRequest {
                    chunk_index: index,
                    attempt,
                    schema_version: PROTOCOL_VERSION,
                    payload: self.plan.chunks[index].payload.clone(),
                };
                log::debug!("Dispatching chunk {} attempt {}", index, attempt);
                carried.insert(index);
                self.in_flight.insert(
                    index,
                    InFlight {
                        attempt,
                        deadline: now + self.config.attempt_timeout(),
                    },
                );
                if dispatch.send(request).is_err() {
                    self.abandon_in_flight("stream sender stopped")?;
                    return Ok(Some(StreamEnd::Broken));
                }
            }

            if self.buffer.is_complete() {
                return Ok(None);
            }
            if self.in_flight.is_empty() && !self.pending.is_empty() {
                // Only the per-stream budget can leave pending work undispatched
                return Ok(Some(StreamEnd::Rotate));
            }

            self.trace.enter(CallState::Receiving);
            let wakeup = self.next_wakeup();
            tokio::select! {
                reply = responses.recv() => match reply {
                    Some(reply) => self.handle_reply(reply)?,
                    None => {
                        log::debug!("Stream closed with {} chunks in flight", self.in_flight.len());
                        self.abandon_in_flight("stream closed")?;
                        return Ok(Some(StreamEnd::Broken));
                    }
                },
                _ = sleep_until_opt(wakeup) => self.expire_deadlines(Instant::now())?,
            }
        }
    }

    async fn run(&mut self, transport: &dyn Transport, credential: &ApiKey) -> Result<()> {
        let started = Instant::now();
        let mut open_failures = 0u32;
        let mut streams = 0usize;

        while !self.buffer.is_complete() {
            if self.pending.is_empty() && self.in_flight.is_empty() {
                // Everything left is waiting on backoff; no stream needed yet
                if let Some(Reverse((ready, _))) = self.retries.peek().copied() {
                    tokio::time::sleep_until(ready).await;
                }
                self.promote_due_retries(Instant::now());
            }

            let stream = match transport.open_stream(credential).await {
                Ok(stream) => stream,
                Err(status) => {
                    open_failures += 1;
                    self.open_failed(status, open_failures, started.elapsed()).await?;
                    continue;
                }
            };
            streams += 1;
            self.trace.enter(CallState::StreamOpen);
            match self.run_stream(stream).await? {
                None => break,
                Some(StreamEnd::Rotate) => log::debug!("Rotating to a new stream after {} streams", streams),
                Some(StreamEnd::Broken) => log::debug!("Reopening broken stream"),
            }
        }
        log::debug!("Call used {} streams", streams);
        Ok(())
    }

    async fn open_failed(&mut self, status: RpcStatus, failures: u32, elapsed: Duration) -> Result<()> {
        let index = self.first_unfinished();
        if status.code.is_auth_failure() {
            return Err(PredictError::Authentication(status.to_string()));
        }
        if !self.config.retry.is_retryable(status.code) {
            return Err(PredictError::Rejected {
                chunk_index: index,
                region: self.chunk(index).region.clone(),
                status,
            });
        }
        let delay = self.config.retry.backoff_delay(failures, &mut self.rng);
        if !self.config.retry.allows_retry(failures, elapsed, delay) {
            return Err(PredictError::ServiceUnavailable {
                chunk_index: index,
                region: self.chunk(index).region.clone(),
                attempts: failures,
                last_status: status,
            });
        }
        log::warn!("Opening stream failed with {}; retrying in {:?}", status, delay);
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn into_results(self) -> Result<Vec<DecodedChunk>> {
        let index = self.first_unfinished();
        let region = self.plan.chunks.get(index).map(|c| c.region.clone()).unwrap_or_default();
        self.buffer.into_ordered().ok_or(PredictError::MalformedResponse {
            chunk_index: index,
            region,
            source: DecodeError::UnexpectedPayload("call ended with missing chunks".to_string()),
        })
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn unexpected(chunk: &PlannedChunk, what: &str) -> PredictError {
    PredictError::MalformedResponse {
        chunk_index: chunk.index,
        region: chunk.region.clone(),
        source: DecodeError::UnexpectedPayload(what.to_string()),
    }
}

/// Client for the remote sequence model
///
/// Cheap to share behind an `Arc`; calls do not share state.
pub struct DnaClient {
    config: ClientConfig,
    credential: Option<ApiKey>,
    transport: Arc<dyn Transport>,
    genes: Option<Arc<GeneIndex>>,
    jitter_seed: Option<u64>,
}

impl DnaClient {
    pub fn new(config: ClientConfig, credential: Option<ApiKey>, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            credential,
            transport,
            genes: None,
            jitter_seed: None,
        })
    }

    /// Gene annotations used by gene mask scorers
    pub fn with_gene_index(mut self, genes: Arc<GeneIndex>) -> Self {
        self.genes = Some(genes);
        self
    }

    /// Fixed seed for retry jitter, for reproducible backoff
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn selection(&self, requested_outputs: &[OutputType], ontology_terms: &[String]) -> OutputSelection {
        OutputSelection {
            organism: self.config.organism,
            requested_outputs: requested_outputs.to_vec(),
            ontology_terms: ontology_terms.to_vec(),
        }
    }

    fn credential(&self) -> Result<&ApiKey> {
        self.credential.as_ref().ok_or_else(|| {
            PredictError::Authentication(format!(
                "no API key configured (set {})",
                self.config.api_key_env
            ))
        })
    }

    fn check_scorers(&self, scorers: &[VariantScorer]) -> Result<()> {
        if self.genes.is_none() {
            if let Some(scorer) = scorers.iter().find(|s| s.needs_genes()) {
                return Err(RequestError::MissingGeneAnnotation(scorer.to_string()).into());
            }
        }
        Ok(())
    }

    /// Plan `request` without contacting the service
    pub fn plan(&self, request: &LogicalRequest, selection: &OutputSelection) -> Result<ChunkPlan> {
        Ok(chunker::plan(request, selection, &self.config.limits)?)
    }

    /// Validate, plan and drive one logical request
    async fn execute(
        &self,
        operation: &'static str,
        request: &LogicalRequest,
        selection: &OutputSelection,
    ) -> Result<(ChunkPlan, Vec<DecodedChunk>)> {
        let credential = self.credential()?;
        let plan = self.plan(request, selection)?;
        let rng = match self.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let call_timeout = self.config.call_timeout();
        let started = Instant::now();
        let mut driver = CallDriver::new(&self.config, &plan, rng, operation);
        let outcome = tokio::time::timeout(call_timeout, driver.run(self.transport.as_ref(), credential)).await;
        let outcome = match outcome {
            Ok(result) => result,
            Err(_) => Err(PredictError::Timeout(call_timeout)),
        };
        if let Err(e) = outcome {
            driver.trace.enter(CallState::Failed);
            log::debug!("{} failed: {}", operation, e);
            return Err(e);
        }
        driver.trace.enter(CallState::Closed);
        log::info!("{}: {} chunks in {:?}", operation, plan.len(), started.elapsed());
        let results = driver.into_results()?;
        Ok((plan, results))
    }

    pub async fn predict_sequence(
        &self,
        sequence: &str,
        requested_outputs: &[OutputType],
        ontology_terms: &[String],
    ) -> Result<Output> {
        let request = LogicalRequest::Sequence {
            sequence: sequence.to_string(),
        };
        let mut outputs = self
            .collect_outputs("predict_sequence", &request, requested_outputs, ontology_terms)
            .await?;
        outputs.pop().ok_or(PredictError::from(RequestError::Empty("sequence")))
    }

    pub async fn predict_interval(
        &self,
        interval: &Interval,
        requested_outputs: &[OutputType],
        ontology_terms: &[String],
    ) -> Result<Output> {
        let mut outputs = self
            .predict_intervals(std::slice::from_ref(interval), requested_outputs, ontology_terms)
            .await?;
        outputs.pop().ok_or(PredictError::from(RequestError::Empty("intervals")))
    }

    /// One output per interval, in input order
    pub async fn predict_intervals(
        &self,
        intervals: &[Interval],
        requested_outputs: &[OutputType],
        ontology_terms: &[String],
    ) -> Result<Vec<Output>> {
        let request = LogicalRequest::Intervals {
            intervals: intervals.to_vec(),
        };
        self.collect_outputs("predict_intervals", &request, requested_outputs, ontology_terms)
            .await
    }

    async fn collect_outputs(
        &self,
        operation: &'static str,
        request: &LogicalRequest,
        requested_outputs: &[OutputType],
        ontology_terms: &[String],
    ) -> Result<Vec<Output>> {
        let selection = self.selection(requested_outputs, ontology_terms);
        let (plan, results) = self.execute(operation, request, &selection).await?;
        plan.chunks
            .iter()
            .zip(results)
            .map(|(chunk, decoded)| match decoded {
                DecodedChunk::Output(output) => Ok(output),
                _ => Err(unexpected(chunk, "expected a prediction output")),
            })
            .collect()
    }

    /// Predict an arbitrary-width locus by tiling it with `tile_length`
    /// windows and stitching the tracks back together
    ///
    /// Only 1D track outputs can be stitched.
    pub async fn predict_locus(
        &self,
        locus: &Interval,
        tile_length: SequenceLength,
        requested_outputs: &[OutputType],
        ontology_terms: &[String],
    ) -> Result<Output> {
        if let Some(output) = requested_outputs.iter().find(|o| !o.is_track()) {
            return Err(RequestError::UnsupportedOutput {
                output: *output,
                operation: "predict_locus",
            }
            .into());
        }
        let request = LogicalRequest::Locus {
            locus: locus.clone(),
            tile_length,
        };
        let tiles = self
            .collect_outputs("predict_locus", &request, requested_outputs, ontology_terms)
            .await?;

        let merge_error = |source: crate::core::error::TrackError| PredictError::MalformedResponse {
            chunk_index: 0,
            region: locus.to_string(),
            source: DecodeError::Merge(source),
        };
        let mut merged = Output::default();
        for output_type in requested_outputs {
            let parts: Vec<TrackData> = tiles
                .iter()
                .filter_map(|tile| tile.get(*output_type).cloned())
                .collect();
            let track = TrackData::concat(&parts)
                .and_then(|t| t.slice_by_interval(locus))
                .map_err(merge_error)?;
            merged.tracks.insert(*output_type, track);
        }
        Ok(merged)
    }

    pub async fn predict_variant(
        &self,
        interval: &Interval,
        variant: &Variant,
        requested_outputs: &[OutputType],
        ontology_terms: &[String],
    ) -> Result<VariantOutput> {
        let request = LogicalRequest::Variants {
            pairs: vec![(interval.clone(), variant.clone())],
        };
        let selection = self.selection(requested_outputs, ontology_terms);
        let (plan, results) = self.execute("predict_variant", &request, &selection).await?;
        let chunk = &plan.chunks[0];
        match results.into_iter().next() {
            Some(DecodedChunk::Variant(output)) => Ok(output),
            _ => Err(unexpected(chunk, "expected reference and alternate outputs")),
        }
    }

    /// Score one variant; results follow the order of `scorers`
    pub async fn score_variant(
        &self,
        interval: &Interval,
        variant: &Variant,
        scorers: &[VariantScorer],
    ) -> Result<Vec<ScoreResult>> {
        let mut scores = self
            .score_variants(&[(interval.clone(), variant.clone())], scorers)
            .await?;
        scores.pop().ok_or(PredictError::from(RequestError::Empty("variants")))
    }

    /// Score many variants; one result list per input pair, each in scorer order
    pub async fn score_variants(
        &self,
        pairs: &[(Interval, Variant)],
        scorers: &[VariantScorer],
    ) -> Result<Vec<Vec<ScoreResult>>> {
        self.check_scorers(scorers)?;
        let request = LogicalRequest::ScoreVariants {
            pairs: pairs.to_vec(),
            scorers: scorers.to_vec(),
        };
        let selection = self.selection(&[], &[]);
        let (plan, results) = self.execute("score_variants", &request, &selection).await?;
        let genes = self.genes.as_deref();

        let per_chunk: Vec<Vec<ScoreResult>> = plan
            .chunks
            .par_iter()
            .zip(results.par_iter())
            .map(|(chunk, decoded)| {
                let DecodedChunk::Variant(output) = decoded else {
                    return Err(unexpected(chunk, "expected reference and alternate outputs"));
                };
                let (interval, variant) = &pairs[chunk.group];
                let ctx = ScoringContext { interval, variant, genes };
                Ok(scoring::score_output(&ctx, &scorers[chunk.scorers.clone()], output)?)
            })
            .collect::<Result<_>>()?;

        // Chunks are variant-major with scorer batches in order
        let mut grouped = vec![Vec::with_capacity(scorers.len()); pairs.len()];
        for (chunk, scores) in plan.chunks.iter().zip(per_chunk) {
            grouped[chunk.group].extend(scores);
        }
        Ok(grouped)
    }

    /// In-silico mutagenesis: score every substitution inside `window`
    ///
    /// Returns one result list per substituted variant, ordered by position
    /// and then alternate base, each in scorer order.
    pub async fn score_ism_variants(
        &self,
        interval: &Interval,
        window: &Interval,
        scorers: &[VariantScorer],
    ) -> Result<Vec<Vec<ScoreResult>>> {
        self.check_scorers(scorers)?;
        let request = LogicalRequest::ScoreIsm {
            interval: interval.clone(),
            window: window.clone(),
            scorers: scorers.to_vec(),
        };
        let selection = self.selection(&[], &[]);
        let (plan, results) = self.execute("score_ism_variants", &request, &selection).await?;
        let genes = self.genes.as_deref();

        let mut windows: Vec<Vec<(Variant, Vec<ScoreResult>)>> = vec![Vec::new(); plan.groups];
        for (chunk, decoded) in plan.chunks.iter().zip(results) {
            let DecodedChunk::Ism { reference, mut variants } = decoded else {
                return Err(unexpected(chunk, "expected mutagenesis outputs"));
            };
            variants.sort_by(|(a, _), (b, _)| {
                (a.position(), a.alternate_bases()).cmp(&(b.position(), b.alternate_bases()))
            });
            let scores = scoring::score_shared_reference(
                interval,
                genes,
                &scorers[chunk.scorers.clone()],
                &reference,
                &variants,
            )?;

            let slot = &mut windows[chunk.group];
            if slot.is_empty() {
                slot.extend(variants.into_iter().map(|(v, _)| v).zip(scores));
                continue;
            }
            // Later scorer batches must see the same substitutions
            if slot.len() != variants.len() || slot.iter().zip(&variants).any(|((a, _), (b, _))| a != b) {
                return Err(unexpected(chunk, "scorer batches disagree on substituted variants"));
            }
            for ((_, merged), extra) in slot.iter_mut().zip(scores) {
                merged.extend(extra);
            }
        }
        Ok(windows
            .into_iter()
            .flatten()
            .map(|(_, scores)| scores)
            .collect())
    }
}
