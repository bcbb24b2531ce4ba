//! Bidirectional chunk streams
//!
//! A transport opens streams; the client owns everything above that
//! (chunk ordering, retries, decoding). Replies may arrive in any order and
//! carry the index and attempt of the request they answer.

use crate::rpc::config::ApiKey;
use crate::rpc::message::{ChunkReply, ChunkRequest, RpcStatus};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Request capacity of one stream before the sender waits
pub const STREAM_BUFFER: usize = 32;

/// Two halves of an open stream
///
/// Dropping `requests` half-closes the stream; the transport closes
/// `responses` once every accepted request has been answered or the
/// connection fails.
#[derive(Debug)]
pub struct RpcStream {
    pub requests: mpsc::Sender<ChunkRequest>,
    pub responses: mpsc::Receiver<ChunkReply>,
}

impl RpcStream {
    /// Channel pair for a transport implementation: the stream handed to the
    /// client plus the transport's ends
    pub fn channel() -> (Self, mpsc::Receiver<ChunkRequest>, mpsc::Sender<ChunkReply>) {
        let (request_tx, request_rx) = mpsc::channel(STREAM_BUFFER);
        let (reply_tx, reply_rx) = mpsc::channel(STREAM_BUFFER);
        (
            Self {
                requests: request_tx,
                responses: reply_rx,
            },
            request_rx,
            reply_tx,
        )
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one stream authenticated with `credential`
    ///
    /// Failures here are retried under the call's retry policy with their
    /// own attempt counter; chunk attempt counts are unaffected.
    async fn open_stream(&self, credential: &ApiKey) -> Result<RpcStream, RpcStatus>;
}
