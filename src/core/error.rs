//! Error types for seqpredict
//!
//! Defines all error types used throughout the library.

use crate::core::output::OutputType;
use crate::rpc::message::RpcStatus;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a failed logical call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input violates a documented constraint; no network call was made
    InvalidRequest,
    /// Missing/invalid credential, or the service refused it
    Authentication,
    /// Transient failures outlasted the retry budget
    ServiceUnavailable,
    /// The service returned a structurally invalid payload
    MalformedResponse,
    /// The service rejected a chunk with a non-transient status
    Rejected,
    /// The overall call deadline elapsed
    Timeout,
    /// Local I/O (input files, transport setup)
    Io,
}

/// Main error type for a logical prediction or scoring call
#[derive(Debug, Error)]
pub enum PredictError {
    /// Request validation errors
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// Scoring configuration errors discovered while aggregating
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// Credential missing, malformed, or refused by the service
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Retry budget exhausted for one chunk
    #[error("Service unavailable: chunk {chunk_index} ({region}) failed after {attempts} attempts: {last_status}")]
    ServiceUnavailable {
        chunk_index: usize,
        region: String,
        attempts: u32,
        last_status: RpcStatus,
    },

    /// Non-transient status returned for one chunk
    #[error("Request rejected for chunk {chunk_index} ({region}): {status}")]
    Rejected {
        chunk_index: usize,
        region: String,
        status: RpcStatus,
    },

    /// Structurally invalid response payload
    #[error("Malformed response for chunk {chunk_index} ({region}): {source}")]
    MalformedResponse {
        chunk_index: usize,
        region: String,
        #[source]
        source: DecodeError,
    },

    /// Overall call deadline elapsed
    #[error("Call did not complete within {0:?}")]
    Timeout(Duration),

    /// Input file errors
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PredictError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::InvalidRequest(_) | PredictError::Scoring(_) => ErrorKind::InvalidRequest,
            PredictError::Authentication(_) => ErrorKind::Authentication,
            PredictError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            PredictError::Rejected { .. } => ErrorKind::Rejected,
            PredictError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            PredictError::Timeout(_) => ErrorKind::Timeout,
            PredictError::Format(_) | PredictError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Errors in genomic coordinates and variants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// start > end
    #[error("Invalid coordinate range: start ({start}) > end ({end})")]
    InvalidRange { start: u64, end: u64 },

    /// Empty chromosome name
    #[error("Chromosome name must not be empty")]
    EmptyChromosome,

    /// Operation would move the interval start below zero
    #[error("Operation on {interval} would produce a negative start")]
    NegativeStart { interval: String },

    /// Clip/slice outside of the allowed boundary
    #[error("{interval} is out of bounds of {boundary}")]
    OutOfBounds { interval: String, boundary: String },

    /// Intervals on different chromosomes
    #[error("Chromosome mismatch: {0} vs {1}")]
    ChromosomeMismatch(String, String),

    /// Invalid split count or window width
    #[error("Cannot split {interval} into {parts} parts")]
    InvalidSplit { interval: String, parts: u64 },

    /// Base outside of {A, C, G, T, N}
    #[error("Invalid base '{0}' (expected one of A, C, G, T, N)")]
    InvalidBase(char),

    /// Variant with identical REF and ALT
    #[error("Variant reference and alternate bases are identical: {0}")]
    NoOpVariant(String),

    /// Unparsable interval or variant string
    #[error("Cannot parse '{0}'")]
    Parse(String),

    /// Invalid strand character
    #[error("Invalid strand '{0}' (expected '+', '-' or '.')")]
    InvalidStrand(String),
}

/// Errors detected while validating a logical request (before any RPC)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Coordinate-level problems
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    /// Width not in the supported sequence length set
    #[error("Unsupported sequence length {0} (supported: 2048, 16384, 131072, 524288, 1048576)")]
    UnsupportedSequenceLength(u64),

    /// No output types requested
    #[error("At least one output type must be requested")]
    NoOutputs,

    /// Malformed ontology term
    #[error("Invalid ontology term '{0}' (expected CURIE such as UBERON:0001157)")]
    InvalidOntologyTerm(String),

    /// Too many ontology terms
    #[error("Too many ontology terms: {count} > {max}")]
    TooManyOntologyTerms { count: usize, max: usize },

    /// Variant not contained in the prediction interval
    #[error("Variant {variant} is not contained in interval {interval}")]
    VariantOutsideInterval { variant: String, interval: String },

    /// Batched inputs of mismatching length
    #[error("Expected {expected} intervals to pair with variants, got {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// Nothing to score or predict
    #[error("Request is empty: {0}")]
    Empty(&'static str),

    /// Invalid scorer configuration
    #[error("Invalid scorer: {0}")]
    InvalidScorer(String),

    /// Scorer needs gene annotations the client was not given
    #[error("Scorer {0} needs a gene annotation index")]
    MissingGeneAnnotation(String),

    /// Output type the operation cannot return
    #[error("{output} is not supported by {operation}")]
    UnsupportedOutput {
        output: OutputType,
        operation: &'static str,
    },

    /// Missing API key and similar config problems
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors decoding a response payload
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Response produced by an incompatible protocol version
    #[error("Incompatible schema version: expected {expected}, found {found}")]
    IncompatibleSchema { expected: u32, found: u32 },

    /// Declared shape inconsistent with the requested interval
    #[error("{output}: shape {rows}x{cols} at resolution {resolution} does not cover width {width}")]
    ShapeMismatch {
        output: OutputType,
        rows: usize,
        cols: usize,
        resolution: u64,
        width: u64,
    },

    /// Number of values inconsistent with the declared shape
    #[error("{output}: declared {expected} values, received {found}")]
    ValueCount {
        output: OutputType,
        expected: usize,
        found: usize,
    },

    /// Metadata entries do not match the channel count
    #[error("{output}: {metadata} metadata entries for {channels} channels")]
    MetadataMismatch {
        output: OutputType,
        metadata: usize,
        channels: usize,
    },

    /// Payload interval differs from the requested interval
    #[error("{output}: payload interval {found} differs from requested {expected}")]
    IntervalMismatch {
        output: OutputType,
        expected: String,
        found: String,
    },

    /// Requested output absent from the payload
    #[error("Requested output {0} missing from response")]
    MissingOutput(OutputType),

    /// Declared dimensions whose element count does not fit in memory
    #[error("{output}: declared shape {shape:?} overflows")]
    ShapeOverflow { output: OutputType, shape: Vec<usize> },

    /// Mutagenesis response does not list every substitution in the window
    #[error("Mutagenesis of {window}: expected {expected} substitutions, received {found}")]
    IncompleteMutagenesis {
        window: String,
        expected: usize,
        found: usize,
    },

    /// Payload variant does not match the request
    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// Chunk parts could not be merged back together
    #[error("Cannot merge chunk parts: {0}")]
    Merge(#[from] TrackError),
}

/// Errors in track container operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// Coordinate-level problems
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    /// Width or offset not a multiple of the track resolution
    #[error("{value} bases is not a multiple of resolution {resolution}")]
    Unaligned { value: u64, resolution: u64 },

    /// Parts differ in type, resolution, channels or are not contiguous
    #[error("Incompatible tracks: {0}")]
    Incompatible(String),

    /// Nothing to concatenate
    #[error("No tracks to concatenate")]
    Empty,
}

/// Errors raised by variant scorers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// Nothing left to aggregate after windowing/masking
    #[error("Empty retained region for {0}")]
    EmptyRegion(String),

    /// Scorer window does not fit the prediction interval
    #[error("Scorer window {window} does not fit prediction interval {interval}")]
    WindowOutOfBounds { window: String, interval: String },

    /// Output needed by the scorer is not in the prediction
    #[error("Output {0} required by scorer is missing")]
    MissingOutput(OutputType),

    /// Reference and alternate containers are not comparable
    #[error("Reference and alternate predictions differ in layout: {0}")]
    LayoutMismatch(String),

    /// Coordinate errors during masking
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    /// Track slicing errors
    #[error(transparent)]
    Track(#[from] TrackError),
}

/// Errors reading VCF/GTF inputs
#[derive(Debug, Error)]
pub enum FormatError {
    /// Too few tab-separated fields
    #[error("Line {line}: expected at least {expected} fields, found {found}")]
    TooFewFields {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Invalid number
    #[error("Line {line}: invalid number in {field}: '{value}'")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    /// Invalid record content
    #[error("Line {line}: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: CoordinateError,
    },

    /// Invalid UTF-8
    #[error("Line {line}: invalid UTF-8")]
    InvalidUtf8 { line: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for logical calls
pub type Result<T> = std::result::Result<T, PredictError>;

/// Result type alias for coordinate operations
pub type CoordinateResult<T> = std::result::Result<T, CoordinateError>;

/// Result type alias for scoring operations
pub type ScoringResult<T> = std::result::Result<T, ScoringError>;

/// Result type alias for track operations
pub type TrackResult<T> = std::result::Result<T, TrackError>;

/// Result type alias for decoding
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::message::StatusCode;

    #[test]
    fn test_error_kinds() {
        let err = PredictError::from(RequestError::UnsupportedSequenceLength(10_000));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = PredictError::ServiceUnavailable {
            chunk_index: 3,
            region: "chr1:0-2048:+".to_string(),
            attempts: 5,
            last_status: RpcStatus::new(StatusCode::Unavailable, "down"),
        };
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        let message = err.to_string();
        assert!(message.contains("chunk 3"));
        assert!(message.contains("5 attempts"));
    }

    #[test]
    fn test_coordinate_error_converts_to_invalid_request() {
        let err: PredictError = RequestError::from(CoordinateError::EmptyChromosome).into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}
