//! Remote prediction service access
//!
//! Request planning, the wire messages, transports and the streaming client.

pub mod chunker;
pub mod client;
pub mod config;
pub mod decoder;
pub mod fake;
pub mod http;
pub mod message;
pub mod reassembly;
pub mod retry;
pub mod transport;

pub use chunker::{plan, tile_locus, ChunkPlan, LogicalRequest, PlannedChunk};
pub use client::DnaClient;
pub use config::{ApiKey, ClientConfig, ServiceLimits, DEFAULT_API_KEY_ENV, DEFAULT_ENDPOINT};
pub use decoder::DecodedChunk;
pub use fake::{Script, ScriptedTransport, SyntheticModel};
pub use http::HttpTransport;
pub use message::{Organism, OutputSelection, RpcStatus, StatusCode, PROTOCOL_VERSION};
pub use reassembly::ReassemblyBuffer;
pub use retry::RetryPolicy;
pub use transport::{RpcStream, Transport};
