//! Client configuration and credentials

use crate::core::error::{PredictError, RequestError, Result};
use crate::rpc::message::Organism;
use crate::rpc::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default environment variable holding the API key
pub const DEFAULT_API_KEY_ENV: &str = "ALPHA_GENOME_API_KEY";

/// Default service endpoint
pub const DEFAULT_ENDPOINT: &str = "https://gdmscience.googleapis.com";

/// Per-request limits enforced by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLimits {
    pub max_scorers_per_request: usize,
    /// Widest in-silico mutagenesis window per request, in bases
    pub max_ism_window: u64,
    pub max_ontology_terms: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_scorers_per_request: 20,
            max_ism_window: 10,
            max_ontology_terms: 100,
        }
    }
}

/// Settings for [`crate::DnaClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub organism: Organism,
    /// Chunks in flight at once
    pub max_parallel_chunks: usize,
    /// Chunks sent on one stream before a fresh stream is opened
    pub max_chunks_per_stream: usize,
    pub attempt_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub limits: ServiceLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            organism: Organism::default(),
            max_parallel_chunks: 8,
            max_chunks_per_stream: 64,
            attempt_timeout_ms: 120_000,
            call_timeout_ms: 900_000,
            retry: RetryPolicy::default(),
            limits: ServiceLimits::default(),
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&text).map_err(|e| {
            RequestError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), RequestError> {
        if self.max_parallel_chunks == 0 {
            return Err(RequestError::InvalidConfig(
                "max_parallel_chunks must be at least 1".to_string(),
            ));
        }
        if self.max_chunks_per_stream == 0 {
            return Err(RequestError::InvalidConfig(
                "max_chunks_per_stream must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_ms == 0 || self.call_timeout_ms == 0 {
            return Err(RequestError::InvalidConfig(
                "timeouts must be positive".to_string(),
            ));
        }
        if self.limits.max_scorers_per_request == 0 || self.limits.max_ism_window == 0 {
            return Err(RequestError::InvalidConfig(
                "service limits must be positive".to_string(),
            ));
        }
        self.retry.validate()
    }
}

/// Service credential
///
/// Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validate a key: non-blank printable ASCII
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            return Err(PredictError::Authentication("API key is empty".to_string()));
        }
        if !key.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(PredictError::Authentication(
                "API key contains non-printable characters".to_string(),
            ));
        }
        Ok(Self(key.to_string()))
    }

    /// Read from environment variable `var`
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(key) => Self::new(key),
            Err(_) => Err(PredictError::Authentication(format!(
                "environment variable {} is not set",
                var
            ))),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_parallel_chunks, 8);
        assert_eq!(config.limits.max_scorers_per_request, 20);
        assert_eq!(config.limits.max_ism_window, 10);
        assert_eq!(config.api_key_env, "ALPHA_GENOME_API_KEY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() -> std::io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        writeln!(temp, r#"{{"max_parallel_chunks": 2, "retry": {{"max_attempts": 3}}}}"#)?;
        temp.flush()?;
        let config = ClientConfig::from_json_file(temp.path()).unwrap();
        assert_eq!(config.max_parallel_chunks, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.max_chunks_per_stream, 64);
        Ok(())
    }

    #[test]
    fn test_from_json_file_rejects_invalid() -> std::io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        writeln!(temp, r#"{{"max_parallel_chunks": 0}}"#)?;
        temp.flush()?;
        let err = ClientConfig::from_json_file(temp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        Ok(())
    }

    #[test]
    fn test_api_key_validation() {
        assert_eq!(ApiKey::new("  abc123  ").unwrap().expose(), "abc123");
        assert_eq!(ApiKey::new("   ").unwrap_err().kind(), ErrorKind::Authentication);
        assert_eq!(ApiKey::new("ab\u{7}c").unwrap_err().kind(), ErrorKind::Authentication);
        assert_eq!(format!("{:?}", ApiKey::new("secret").unwrap()), "ApiKey(***)");
    }

    #[test]
    fn test_api_key_missing_env() {
        let err = ApiKey::from_env("SEQPREDICT_TEST_UNSET_VARIABLE").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
