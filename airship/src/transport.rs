//! Transport abstraction for bundle size probes and body transfers.
//!
//! The download manager only ever sees [`Transport`]; the default
//! implementation wraps a blocking reqwest client and owns the
//! authentication headers.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, RANGE};

use crate::error::{EngineError, EngineResult};

/// Header carrying the application token.
pub const APP_TOKEN_HEADER: &str = "x-app-token";

/// Header carrying the SDK token.
pub const SDK_TOKEN_HEADER: &str = "x-sdk-token";

/// HTTP method used by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A single transport request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    /// First byte requested; `None` requests the whole resource.
    pub range_start: Option<u64>,
}

impl TransportRequest {
    /// Size probe (HEAD) for `url`.
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Head,
            range_start: None,
        }
    }

    /// Body transfer for `url`, starting at `offset` when non-zero.
    pub fn get(url: impl Into<String>, offset: u64) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            range_start: (offset > 0).then_some(offset),
        }
    }
}

/// Response to a [`TransportRequest`].
pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Authenticated HTTP primitive.
pub trait Transport: Send + Sync {
    /// Perform `request` and return its status, length and body stream.
    fn request(&self, request: &TransportRequest) -> EngineResult<TransportResponse>;
}

/// [`Transport`] backed by a blocking reqwest client.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: Client,
    app_token: String,
    sdk_token: String,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport sending the given tokens.
    pub fn new(
        app_token: impl Into<String>,
        sdk_token: impl Into<String>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                EngineError::network("<client>", format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            app_token: app_token.into(),
            sdk_token: sdk_token.into(),
            timeout,
        })
    }
}

impl Transport for ReqwestTransport {
    fn request(&self, request: &TransportRequest) -> EngineResult<TransportResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Head => self.client.head(&request.url),
        };
        if let Some(start) = request.range_start {
            builder = builder.header(RANGE, format!("bytes={}-", start));
        }
        if !self.app_token.is_empty() {
            builder = builder.header(APP_TOKEN_HEADER, &self.app_token);
        }
        if !self.sdk_token.is_empty() {
            builder = builder.header(SDK_TOKEN_HEADER, &self.sdk_token);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                EngineError::network(
                    &request.url,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            } else {
                EngineError::network(&request.url, e.to_string())
            }
        })?;

        // reqwest reports a zero length for HEAD bodies; read the header instead.
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        Ok(TransportResponse {
            status: response.status().as_u16(),
            content_length,
            body: Box::new(response),
        })
    }
}
