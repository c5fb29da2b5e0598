//! Streaming HTTP client for the relay endpoint.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use repolens_core::protocol::StreamRequest;
use repolens_core::{RepoLensError, Result};

/// Raw byte chunks of one streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Opens the long-lived streaming request against a gateway.
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl StreamClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// `POST /api/chat/stream`. A non-2xx response is a hard failure; no
    /// attempt is made to parse its body.
    pub async fn open(&self, request: &StreamRequest) -> Result<ByteStream> {
        let url = format!(
            "{}/api/chat/stream",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| RepoLensError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepoLensError::Transport(format!(
                "unexpected status {status}"
            )));
        }

        Ok(Box::pin(response.bytes_stream()))
    }
}
