//! JSON-over-HTTP transport
//!
//! Each chunk is one POST to `{endpoint}/v1/chunks`. A stream is a local
//! fan-out: requests are posted concurrently and replies are forwarded in
//! completion order.

use crate::rpc::config::ApiKey;
use crate::rpc::message::{ChunkReply, ChunkRequest, ChunkResponse, RpcStatus, StatusCode};
use crate::rpc::transport::{RpcStream, Transport};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const CHUNK_PATH: &str = "/v1/chunks";
const API_KEY_HEADER: &str = "x-api-key";

pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Transport posting to `endpoint` with a per-request `timeout`
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("seqpredict/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{}", endpoint.trim_end_matches('/'), CHUNK_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Map an HTTP status onto the RPC status space
pub fn status_from_http(status: reqwest::StatusCode) -> StatusCode {
    match status.as_u16() {
        400 => StatusCode::InvalidArgument,
        401 => StatusCode::Unauthenticated,
        403 => StatusCode::PermissionDenied,
        408 => StatusCode::DeadlineExceeded,
        409 => StatusCode::Aborted,
        412 => StatusCode::FailedPrecondition,
        429 => StatusCode::ResourceExhausted,
        502..=504 => StatusCode::Unavailable,
        _ => StatusCode::Internal,
    }
}

fn status_from_error(error: &reqwest::Error) -> RpcStatus {
    let code = if error.is_timeout() {
        StatusCode::DeadlineExceeded
    } else if error.is_connect() || error.is_request() {
        StatusCode::Unavailable
    } else if error.is_decode() {
        StatusCode::Internal
    } else {
        StatusCode::Unknown
    };
    RpcStatus::new(code, error.to_string())
}

async fn post_chunk(client: &Client, url: &str, key: &str, request: &ChunkRequest) -> Result<ChunkResponse, RpcStatus> {
    let response = client
        .post(url)
        .header(API_KEY_HEADER, key)
        .json(request)
        .send()
        .await
        .map_err(|e| status_from_error(&e))?;

    let status = response.status();
    if status.is_success() {
        return response.json::<ChunkResponse>().await.map_err(|e| status_from_error(&e));
    }

    // Error bodies usually carry a status object; fall back to the HTTP code
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<RpcStatus>(&body) {
        Ok(rpc_status) => Err(rpc_status),
        Err(_) => Err(RpcStatus::new(status_from_http(status), format!("HTTP {}: {}", status, body.trim()))),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(&self, credential: &ApiKey) -> Result<RpcStream, RpcStatus> {
        let (stream, mut requests, replies) = RpcStream::channel();
        let client = self.client.clone();
        let url = self.url.clone();
        let key = credential.expose().to_string();

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let client = client.clone();
                let url = url.clone();
                let key = key.clone();
                let replies = replies.clone();
                tokio::spawn(async move {
                    log::trace!("POST chunk {} attempt {}", request.chunk_index, request.attempt);
                    let reply = match post_chunk(&client, &url, &key, &request).await {
                        Ok(response) => ChunkReply {
                            chunk_index: request.chunk_index,
                            attempt: request.attempt,
                            result: Ok(response),
                        },
                        Err(status) => ChunkReply::err(&request, status),
                    };
                    // Receiver gone means the call was abandoned
                    let _ = replies.send(reply).await;
                });
            }
        });
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_from_http(reqwest::StatusCode::TOO_MANY_REQUESTS), StatusCode::ResourceExhausted);
        assert_eq!(status_from_http(reqwest::StatusCode::SERVICE_UNAVAILABLE), StatusCode::Unavailable);
        assert_eq!(status_from_http(reqwest::StatusCode::BAD_GATEWAY), StatusCode::Unavailable);
        assert_eq!(status_from_http(reqwest::StatusCode::UNAUTHORIZED), StatusCode::Unauthenticated);
        assert_eq!(status_from_http(reqwest::StatusCode::FORBIDDEN), StatusCode::PermissionDenied);
        assert_eq!(status_from_http(reqwest::StatusCode::BAD_REQUEST), StatusCode::InvalidArgument);
        assert_eq!(status_from_http(reqwest::StatusCode::INTERNAL_SERVER_ERROR), StatusCode::Internal);
    }

    #[test]
    fn test_url_join() {
        let transport = HttpTransport::new("https://example.org/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.url(), "https://example.org/v1/chunks");
    }
}
