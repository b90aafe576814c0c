//! Upload of candidate file bytes to the remote endpoint.

use crate::config::EndpointConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Longest response body kept as a failure description
const MAX_FAILURE_BODY_CHARS: usize = 512;

#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Credential is not a valid header value")]
    InvalidCredential,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Outcome of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionResult {
    /// HTTP status code
    pub status: u16,
    /// Response body excerpt for non-2xx responses
    pub failure: Option<String>,
}

impl TransmissionResult {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            failure: None,
        }
    }

    /// Status in [200, 300)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers a payload and reports the response status
///
/// Transport failures (DNS, refused connection, timeout) are errors; any
/// completed exchange, including non-2xx, is an `Ok`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn transmit(&self, body: Vec<u8>) -> Result<TransmissionResult, TransmitError>;
}

/// [`Transmitter`] that POSTs to a fixed endpoint
pub struct HttpTransmitter {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTransmitter {
    pub fn new(config: &EndpointConfig) -> Result<Self, TransmitError> {
        let mut credential =
            HeaderValue::from_str(&config.api_key).map_err(|_| TransmitError::InvalidCredential)?;
        credential.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, credential);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(TransmitError::Client)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Transmitter for HttpTransmitter {
    #[instrument(skip(self, body), fields(url = %self.url, size_bytes = body.len()))]
    async fn transmit(&self, body: Vec<u8>) -> Result<TransmissionResult, TransmitError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransmitError::Timeout(self.timeout)
                } else {
                    TransmitError::Network(e)
                }
            })?;

        let status = response.status();
        debug!(status = status.as_u16(), "Endpoint responded");

        if status.is_success() {
            return Ok(TransmissionResult::new(status.as_u16()));
        }

        let body = response.text().await.unwrap_or_default();
        let failure = if body.is_empty() {
            status.canonical_reason().unwrap_or("no reason").to_string()
        } else {
            body.chars().take(MAX_FAILURE_BODY_CHARS).collect()
        };

        Ok(TransmissionResult {
            status: status.as_u16(),
            failure: Some(failure),
        })
    }
}
