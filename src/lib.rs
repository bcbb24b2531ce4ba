//! seqpredict - Client for a remote genomic sequence model
//!
//! Plans, sends and reassembles prediction requests against a remote
//! sequence-to-function model, and scores variant effects locally.
//!
//! # Features
//!
//! - Interval, variant and locus predictions with typed track containers
//! - Automatic chunking within the service limits (sequence lengths,
//!   scorers per request, mutagenesis window)
//! - Streaming transport with per-chunk retries, backoff and ordered reassembly
//! - CenterMask, GeneMask, SpliceJunction and ContactMap variant scorers
//! - VCF and GTF/GFF3 readers (plain, gzip, bzip2)
//!
//! # Example
//!
//! ```ignore
//! use seqpredict::{ApiKey, ClientConfig, DnaClient, HttpTransport, Interval, OutputType};
//! use std::sync::Arc;
//!
//! let config = ClientConfig::default();
//! let transport = HttpTransport::new(&config.endpoint, config.attempt_timeout())?;
//! let key = ApiKey::from_env(&config.api_key_env)?;
//! let client = DnaClient::new(config, Some(key), Arc::new(transport))?;
//!
//! let interval: Interval = "chr22:35677410-36725986:+".parse()?;
//! let output = client
//!     .predict_interval(&interval, &[OutputType::RnaSeq], &["UBERON:0001157".to_string()])
//!     .await?;
//! ```

pub mod core;
pub mod formats;
pub mod rpc;
pub mod scoring;

// Re-export commonly used types
pub use core::{
    ChannelMetadata, ContactMapData, ErrorKind, GeneAnnotation, GeneIndex, Interval, JunctionData,
    Output, OutputType, PredictError, RequestError, Result, SequenceLength, Strand, TrackData,
    Variant, VariantOutput,
};
pub use rpc::{
    ApiKey, ClientConfig, DnaClient, HttpTransport, Organism, RetryPolicy, ScriptedTransport,
    Transport,
};
pub use scoring::{
    recommended_scorers, AggregationType, CenterMaskScorer, ContactMapScorer, GeneMaskMode,
    GeneMaskScorer, ScoreResult, SpliceJunctionScorer, VariantScorer,
};
