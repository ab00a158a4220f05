use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::host::EmbeddingConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for an OpenAI-compatible embeddings endpoint. No retries; a
/// failed call returns `None` and the caller decides what that means.
pub struct RemoteEmbeddingClient {
    http: Client,
}

impl Default for RemoteEmbeddingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteEmbeddingClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http }
    }

    pub fn embed(&self, text: &str, config: &EmbeddingConfig) -> Option<Vec<f32>> {
        if !config.is_valid() {
            tracing::warn!("remote embedding config incomplete");
            return None;
        }
        let payload = serde_json::json!({
            "model": config.model,
            "input": text,
        });
        let response = match self
            .http
            .post(&config.api_url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("embedding request failed: {err}");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!("embedding endpoint returned {}", response.status());
            return None;
        }
        let body = match response.text() {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("failed to read embedding response: {err}");
                return None;
            }
        };
        if body.trim().is_empty() {
            tracing::warn!("embedding response body was empty");
            return None;
        }
        let parsed: EmbeddingResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!("malformed embedding response: {err}");
                return None;
            }
        };
        match parsed.data.into_iter().next() {
            Some(entry) => Some(entry.embedding),
            None => {
                tracing::warn!("embedding response contained no data");
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
