//! HTTP backend: one JSON POST per agent invocation

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{AgentBackend, CallOptions, CallResult};

/// Backend reached over HTTP.
///
/// Sends `{ "message", "agent_id", "session_id" }` and accepts either a
/// `{ "success", "response", "raw_response" }` envelope or any other JSON
/// body, which is taken as the response payload itself.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked_key = if self.api_key.is_empty() {
            "(none)".to_string()
        } else {
            "***".to_string()
        };
        f.debug_struct("HttpBackend")
            .field("client", &"<reqwest::Client>")
            .field("endpoint", &self.endpoint)
            .field("api_key", &masked_key)
            .finish()
    }
}

impl HttpBackend {
    /// Create a backend posting to `endpoint`. An empty `api_key` sends no
    /// authorization header.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Interpret a successful HTTP body
fn parse_body(body: String) -> CallResult {
    match serde_json::from_str::<Value>(&body) {
        Ok(value) if is_envelope(&value) => match serde_json::from_value::<CallResult>(value) {
            Ok(mut envelope) => {
                envelope.raw_response.get_or_insert(body);
                envelope
            }
            Err(e) => {
                debug!("Envelope-like body did not deserialize ({}), using it as payload", e);
                CallResult {
                    success: true,
                    response: serde_json::from_str(&body).ok(),
                    raw_response: Some(body),
                }
            }
        },
        Ok(value) => CallResult {
            success: true,
            response: Some(value),
            raw_response: Some(body),
        },
        Err(_) => CallResult {
            success: true,
            response: None,
            raw_response: Some(body),
        },
    }
}

fn is_envelope(value: &Value) -> bool {
    value.get("success").is_some_and(Value::is_boolean)
        && (value.get("response").is_some() || value.get("raw_response").is_some())
}

#[async_trait]
impl AgentBackend for HttpBackend {
    fn backend_name(&self) -> &str {
        "http"
    }

    async fn send(
        &self,
        prompt: &str,
        backend_id: &str,
        options: &CallOptions,
    ) -> Result<CallResult> {
        let body = serde_json::json!({
            "message": prompt,
            "agent_id": backend_id,
            "session_id": options.session_id,
        });

        debug!(
            "Sending {} char prompt to {} (session {})",
            prompt.len(),
            self.endpoint,
            options.session_id
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to agent backend")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read agent backend response")?;

        if !status.is_success() {
            warn!("Agent backend returned status {}: {}", status, text);
            return Ok(CallResult::failed(Some(text)));
        }

        debug!("Agent backend replied with {} bytes", text.len());
        Ok(parse_body(text))
    }
}
