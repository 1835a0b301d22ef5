//! Transport collaborator used by every panel to talk to the dashboard API.
//!
//! The dashboard only ever needs two verbs: `get` for list endpoints and `post`
//! for state-changing commands. Both return the decoded JSON body.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {path} failed: {message}")]
    Request { path: String, message: String },
    #[error("{message} (HTTP {status})")]
    Status {
        path: String,
        status: u16,
        message: String,
    },
    #[error("Invalid response from {path}: {message}")]
    Decode { path: String, message: String },
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, TransportError>;

    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError>;
}

/// `Transport` backed by a shared `reqwest::Client`.
///
/// No per-request timeout is configured here; a hung request stays pending until
/// the connection itself fails.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Request {
                path: base_url.to_string(),
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_response(
        path: &str,
        response: reqwest::Response,
    ) -> Result<Value, TransportError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| TransportError::Request {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let fallback = status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string();
            return Err(TransportError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                message: error_message_from_body(&body).unwrap_or(fallback),
            });
        }

        decode_body(path, &body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        debug!(path = %path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| TransportError::Request {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Self::read_response(path, response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        debug!(path = %path, "POST");
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Self::read_response(path, response).await
    }
}

/// Empty bodies (e.g. `204 No Content` on commands) decode to `Value::Null`.
fn decode_body(path: &str, body: &str) -> Result<Value, TransportError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| TransportError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Pulls a human-readable message out of an error body shaped like
/// `{"error": "..."}` or `{"message": "..."}`, falling back to the raw text.
fn error_message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => ["error", "message"]
            .iter()
            .find_map(|field| json.get(field).and_then(Value::as_str))
            .map(str::to_string),
        Err(_) => Some(trimmed.to_string()),
    }
}
