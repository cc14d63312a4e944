//! Call contract between the orchestrator and the reasoning backend

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-call options. The session id lets the backend keep separate
/// conversational memory for every (room, agent) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    pub session_id: String,
}

impl CallOptions {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Result of a single backend call, as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl CallResult {
    pub fn ok(response: Value) -> Self {
        Self {
            success: true,
            response: Some(response),
            raw_response: None,
        }
    }

    pub fn failed(raw_response: Option<String>) -> Self {
        Self {
            success: false,
            response: None,
            raw_response,
        }
    }

    /// The payload to normalize: the structured response when present,
    /// otherwise the raw body as a string
    pub fn payload(&self) -> Option<Value> {
        self.response
            .clone()
            .or_else(|| self.raw_response.clone().map(Value::String))
    }
}

/// Trait every reasoning backend implements.
///
/// One call per invocation; implementations must not retry on their own.
/// An `Err` means the call could not be completed at all.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Human-readable backend name for logs (e.g. "http")
    fn backend_name(&self) -> &str;

    async fn send(
        &self,
        prompt: &str,
        backend_id: &str,
        options: &CallOptions,
    ) -> Result<CallResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_prefers_structured_response() {
        let result = CallResult {
            success: true,
            response: Some(serde_json::json!({"message": "hi"})),
            raw_response: Some("{\"message\":\"hi\"}".to_string()),
        };
        assert_eq!(result.payload().unwrap()["message"], "hi");
    }

    #[test]
    fn test_payload_falls_back_to_raw_string() {
        let result = CallResult {
            success: true,
            response: None,
            raw_response: Some("plain".to_string()),
        };
        assert_eq!(result.payload(), Some(Value::String("plain".to_string())));
    }

    #[test]
    fn test_payload_none_when_empty() {
        assert!(CallResult::default().payload().is_none());
        assert!(!CallResult::failed(None).success);
    }

    #[test]
    fn test_call_result_deserialize_partial() {
        let result: CallResult = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!result.success);
        assert!(result.response.is_none());
        assert!(result.raw_response.is_none());
    }
}
