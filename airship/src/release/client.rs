//! Release-check client.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use super::types::ReleaseCheckRequest;
use crate::error::{EngineError, EngineResult};
use crate::transport::{APP_TOKEN_HEADER, SDK_TOKEN_HEADER};

/// Performs the remote release-check call.
///
/// Implementations return the raw response body; shape normalization is
/// done by the sync coordinator.
pub trait ReleaseClient: Send + Sync {
    fn check(&self, request: &ReleaseCheckRequest) -> EngineResult<Value>;
}

/// [`ReleaseClient`] posting JSON with a blocking reqwest client.
#[derive(Debug)]
pub struct HttpReleaseClient {
    client: Client,
    url: String,
    app_token: String,
    sdk_token: String,
}

impl HttpReleaseClient {
    /// Create a client for the given endpoint.
    pub fn new(
        url: impl Into<String>,
        app_token: impl Into<String>,
        sdk_token: impl Into<String>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                EngineError::network(&url, format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            url,
            app_token: app_token.into(),
            sdk_token: sdk_token.into(),
        })
    }

    /// Endpoint this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReleaseClient for HttpReleaseClient {
    fn check(&self, request: &ReleaseCheckRequest) -> EngineResult<Value> {
        let mut builder = self.client.post(&self.url).json(request);
        if !self.app_token.is_empty() {
            builder = builder.header(APP_TOKEN_HEADER, &self.app_token);
        }
        if !self.sdk_token.is_empty() {
            builder = builder.header(SDK_TOKEN_HEADER, &self.sdk_token);
        }

        let response = builder
            .send()
            .map_err(|e| EngineError::network(&self.url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::network(
                &self.url,
                format!("release check failed with status {}", status),
            ));
        }

        response
            .json::<Value>()
            .map_err(|e| EngineError::ResponseParseError(e.to_string()))
    }
}
