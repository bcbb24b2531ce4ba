//! Core genomic data model
//!
//! Coordinates, prediction containers, gene annotations and the shared
//! error types.

pub mod annotation;
pub mod contact_map;
pub mod dna;
pub mod error;
pub mod genome;
pub mod io;
pub mod junctions;
pub mod output;
pub mod track;

pub use annotation::{GeneAnnotation, GeneIndex};
pub use contact_map::ContactMapData;
pub use error::{
    CoordinateError, CoordinateResult, DecodeError, DecodeResult, ErrorKind, FormatError,
    PredictError, RequestError, Result, ScoringError, ScoringResult, TrackError, TrackResult,
};
pub use genome::{intersect_intervals, Interval, SequenceLength, Strand, Variant};
pub use io::{detect_compression, open_reader, ByteLineIterator, CompressionFormat, DEFAULT_BUFFER_SIZE};
pub use junctions::JunctionData;
pub use output::{Output, OutputType, VariantOutput};
pub use track::{ChannelMetadata, TrackData};
