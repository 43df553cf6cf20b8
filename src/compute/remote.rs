//! HTTP client for an upstream risk engine.
//!
//! The engine runs as a separate process and exposes three endpoints:
//!
//! ```text
//! POST {engine}/requests/{request_id}   JSON request  -> JSON result
//! POST {engine}/images                  ImageRequest  -> PNG bytes
//! POST {engine}/reset                   (empty)       -> 2xx
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::ComputeError;

use super::image::ImageRequest;
use super::request::RequestKind;
use super::Requester;

/// Default timeout for engine calls. Whole-array renders can be slow.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest error body kept in [`ComputeError::Upstream`].
const MAX_ERROR_BODY: usize = 512;

/// [`Requester`] backed by an engine reachable over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteRequester {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteRequester {
    /// Create a client for the engine at `base_url`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ComputeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ComputeError::Connection(e.to_string()))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a requester around an existing client.
    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ComputeError> {
        self.base_url
            .join(path)
            .map_err(|e| ComputeError::Connection(format!("invalid engine URL: {}", e)))
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ComputeError> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "Forwarding to engine");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ComputeError::Connection(e.to_string()))?;

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ComputeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }

    if status == StatusCode::NOT_FOUND {
        Err(ComputeError::NotFound(message))
    } else {
        Err(ComputeError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Requester for RemoteRequester {
    async fn get(
        &self,
        kind: RequestKind,
        request: Map<String, Value>,
    ) -> Result<String, ComputeError> {
        let path = format!("requests/{}", kind.as_str());
        let response = self.post(&path, &request).await?;
        response
            .text()
            .await
            .map_err(|e| ComputeError::InvalidResponse(e.to_string()))
    }

    async fn get_image(&self, request: &ImageRequest) -> Result<Bytes, ComputeError> {
        let response = self.post("images", request).await?;
        response
            .bytes()
            .await
            .map_err(|e| ComputeError::InvalidResponse(e.to_string()))
    }

    async fn reset(&self) -> Result<(), ComputeError> {
        self.post("reset", &Value::Null).await.map(|_| ())
    }
}
