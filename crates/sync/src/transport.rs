//! The network seam.
//!
//! Everything the kiosk sends goes through a [`Transport`]. The production
//! implementation is [`HttpTransport`] (reqwest); the activity coordinator
//! wraps whichever transport is installed to observe every request.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderValue, ACCEPT, ETAG, IF_NONE_MATCH};

use crate::error::{FetchError, Result};

/// Default timeout for requests that do not set their own.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fixed allowance for the request line and the headers every request carries.
pub const REQUEST_OVERHEAD_BYTES: u64 = 300;

/// Fixed allowance for the status line and response headers.
pub const RESPONSE_OVERHEAD_BYTES: u64 = 200;

/// A GET request against the building API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Path relative to the API base URL, starting with `/`.
    pub path: String,
    /// Cache validator from the previous response, sent as `If-None-Match`.
    pub if_none_match: Option<String>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            if_none_match: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.if_none_match = Some(validator.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rough number of bytes this request puts on the wire.
    pub fn estimated_size(&self) -> u64 {
        let validator = self
            .if_none_match
            .as_ref()
            .map(|v| v.len() + "If-None-Match: \r\n".len())
            .unwrap_or(0);
        REQUEST_OVERHEAD_BYTES + (self.path.len() + validator) as u64
    }
}

/// Raw response as seen by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Cache validator returned by the server, if any.
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    /// Rough number of bytes this response took on the wire.
    pub fn estimated_size(&self) -> u64 {
        let etag = self
            .etag
            .as_ref()
            .map(|v| v.len() + "ETag: \r\n".len())
            .unwrap_or(0);
        RESPONSE_OVERHEAD_BYTES + (self.body.len() + etag) as u64
    }
}

/// Sends requests to the building API.
///
/// Implementations report failures as [`FetchError`]; they never panic on
/// network conditions.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport for a fixed API base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. "https://building.example/api").
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .get(&url)
            .timeout(request.timeout)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(validator) = &request.if_none_match {
            let value = HeaderValue::from_str(validator).map_err(|_| {
                FetchError::InvalidRequest(format!("Invalid cache validator: {:?}", validator))
            })?;
            builder = builder.header(IF_NONE_MATCH, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&request.path, request.timeout, e))?;

        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&request.path, request.timeout, e))?
            .to_vec();

        debug!(
            "GET {} -> {} ({} bytes, etag: {:?})",
            request.path,
            status,
            body.len(),
            etag
        );

        Ok(TransportResponse { status, etag, body })
    }
}
