//! Wire messages exchanged with the prediction service
//!
//! Every request and response carries `schema_version`; the client refuses
//! responses whose version differs from [`PROTOCOL_VERSION`].

use crate::core::error::CoordinateResult;
use crate::core::genome::{Interval, Variant};
use crate::core::output::OutputType;
use crate::core::track::ChannelMetadata;
use crate::scoring::VariantScorer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message schema version spoken by this client
pub const PROTOCOL_VERSION: u32 = 1;

/// Chromosome label used to anchor raw-sequence predictions
pub const SEQUENCE_CHROMOSOME: &str = "sequence";

/// RPC status codes the service may return for a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    ResourceExhausted,
    Unavailable,
    DeadlineExceeded,
    Aborted,
    FailedPrecondition,
    Internal,
    Unknown,
}

impl StatusCode {
    /// Statuses that end the whole call as an authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, StatusCode::Unauthenticated | StatusCode::PermissionDenied)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::Aborted => "ABORTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Status attached to a failed chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Organism whose genome the coordinates refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Organism {
    #[default]
    HomoSapiens,
    MusMusculus,
}

/// What to predict, shared by every request shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSelection {
    pub organism: Organism,
    pub requested_outputs: Vec<OutputType>,
    pub ontology_terms: Vec<String>,
}

/// Request body for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    PredictSequence {
        sequence: String,
        selection: OutputSelection,
    },
    PredictInterval {
        interval: Interval,
        selection: OutputSelection,
    },
    PredictVariant {
        interval: Interval,
        variant: Variant,
        selection: OutputSelection,
    },
    ScoreVariant {
        interval: Interval,
        variant: Variant,
        selection: OutputSelection,
        scorers: Vec<VariantScorer>,
    },
    ScoreIsm {
        interval: Interval,
        window: Interval,
        selection: OutputSelection,
        scorers: Vec<VariantScorer>,
    },
}

impl RequestPayload {
    pub fn selection(&self) -> &OutputSelection {
        match self {
            RequestPayload::PredictSequence { selection, .. }
            | RequestPayload::PredictInterval { selection, .. }
            | RequestPayload::PredictVariant { selection, .. }
            | RequestPayload::ScoreVariant { selection, .. }
            | RequestPayload::ScoreIsm { selection, .. } => selection,
        }
    }

    /// Interval the returned tracks must cover
    pub fn target_interval(&self) -> CoordinateResult<Interval> {
        match self {
            RequestPayload::PredictSequence { sequence, .. } => {
                Interval::new(SEQUENCE_CHROMOSOME, 0, sequence.len() as u64)
            }
            RequestPayload::PredictInterval { interval, .. }
            | RequestPayload::PredictVariant { interval, .. }
            | RequestPayload::ScoreVariant { interval, .. }
            | RequestPayload::ScoreIsm { interval, .. } => Ok(interval.clone()),
        }
    }
}

/// One chunk sent on a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub chunk_index: usize,
    pub attempt: u32,
    pub schema_version: u32,
    pub payload: RequestPayload,
}

/// Successful response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub schema_version: u32,
    pub payload: ResponsePayload,
}

/// Reply for one chunk attempt, tagged so stale attempts can be discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReply {
    pub chunk_index: usize,
    pub attempt: u32,
    pub result: Result<ChunkResponse, RpcStatus>,
}

impl ChunkReply {
    pub fn ok(request: &ChunkRequest, payload: ResponsePayload) -> Self {
        Self {
            chunk_index: request.chunk_index,
            attempt: request.attempt,
            result: Ok(ChunkResponse {
                schema_version: PROTOCOL_VERSION,
                payload,
            }),
        }
    }

    pub fn err(request: &ChunkRequest, status: RpcStatus) -> Self {
        Self {
            chunk_index: request.chunk_index,
            attempt: request.attempt,
            result: Err(status),
        }
    }
}

/// Response body variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePayload {
    Output {
        output: RawOutput,
    },
    VariantOutput {
        reference: RawOutput,
        alternate: RawOutput,
    },
    IsmOutputs {
        reference: RawOutput,
        variants: Vec<RawIsmVariant>,
    },
}

/// Alternate predictions for one in-silico substitution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIsmVariant {
    pub variant: Variant,
    pub alternate: RawOutput,
}

/// Undecoded predictions for one interval
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawOutput {
    pub tracks: Vec<RawTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splice_junctions: Option<RawJunctions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_maps: Option<RawContactMap>,
}

/// Row-major `[rows x channels]` track values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    pub output_type: OutputType,
    pub interval: Interval,
    pub resolution: u64,
    pub shape: [usize; 2],
    pub values: Vec<f32>,
    pub metadata: Vec<ChannelMetadata>,
}

/// Row-major `[junctions x channels]` counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawJunctions {
    pub interval: Interval,
    pub junctions: Vec<Interval>,
    pub values: Vec<f32>,
    pub metadata: Vec<ChannelMetadata>,
}

/// Row-major `[bins x bins x channels]` contacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContactMap {
    pub interval: Interval,
    pub resolution: u64,
    pub shape: [usize; 3],
    pub values: Vec<f32>,
    pub metadata: Vec<ChannelMetadata>,
}
