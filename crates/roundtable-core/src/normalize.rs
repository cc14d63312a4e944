//! Reply normalization for backend payloads of unknown shape
//!
//! The backend does not promise a single reply layout. Text is pulled out by
//! trying a fixed list of known shapes in order; metadata (agent name,
//! confidence, tone, references) is read independently with per-field
//! defaults. Normalization never fails: a payload with no recognizable text
//! yields an empty `text`, which the invoker reports as a failed call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names checked inside a structured `result` object, in priority order
const RESULT_TEXT_FIELDS: &[&str] = &["response", "text", "message", "content", "answer"];

/// Field names checked inside a JSON-encoded string payload
const ENCODED_TEXT_FIELDS: &[&str] = &["response", "text", "message"];

/// Text and metadata extracted from one backend reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReply {
    pub text: String,
    pub agent_name: String,
    pub confidence: f64,
    pub tone: String,
    pub references: Vec<String>,
}

impl NormalizedReply {
    /// Render back into the canonical `{ "result": { ... } }` reply shape
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "result": {
                "response": self.text,
                "agent_name": self.agent_name,
                "confidence": self.confidence,
                "tone": self.tone,
                "references": self.references,
            }
        })
    }
}

/// The reply layouts text can be found in, tried in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// `{ "result": { "response" | "text" | "message" | "content" | "answer": "..." } }`
    StructuredResult,
    /// `{ "message": "..." }`
    TopLevelMessage,
    /// `"..."`, possibly itself a JSON document
    EncodedString,
    /// `{ "response": "..." }`
    TopLevelResponse,
}

impl ReplyShape {
    pub const ORDER: [ReplyShape; 4] = [
        ReplyShape::StructuredResult,
        ReplyShape::TopLevelMessage,
        ReplyShape::EncodedString,
        ReplyShape::TopLevelResponse,
    ];

    /// Try to read non-empty text assuming this shape
    fn extract(&self, payload: &Payload<'_>) -> Option<String> {
        match self {
            Self::StructuredResult => result_object(payload.raw)
                .and_then(|result| first_text(result, RESULT_TEXT_FIELDS)),
            Self::TopLevelMessage => payload.raw.get("message").and_then(text_str),
            Self::EncodedString => {
                let raw = payload.raw.as_str()?;
                match &payload.decoded {
                    Some(Value::Object(map)) => first_text(map, ENCODED_TEXT_FIELDS),
                    Some(Value::String(inner)) => reply_text(inner),
                    _ => reply_text(raw),
                }
            }
            Self::TopLevelResponse => payload.raw.get("response").and_then(text_str),
        }
    }
}

/// A raw reply plus its decoded form when the reply is a JSON string
struct Payload<'a> {
    raw: &'a Value,
    decoded: Option<Value>,
}

impl<'a> Payload<'a> {
    fn new(raw: &'a Value) -> Self {
        let decoded = raw
            .as_str()
            .and_then(|s| serde_json::from_str::<Value>(s).ok());
        Self { raw, decoded }
    }

    /// The object metadata fields are read from
    fn metadata(&self) -> Option<&Map<String, Value>> {
        result_object(self.raw)
            .or_else(|| {
                self.decoded
                    .as_ref()
                    .and_then(|d| result_object(d).or(d.as_object()))
            })
            .or_else(|| self.raw.as_object())
    }
}

/// Extract text and metadata from an arbitrarily shaped reply.
///
/// `fallback_name` and `fallback_tone` come from the agent configuration and
/// fill in whatever the payload leaves out.
pub fn normalize(raw: &Value, fallback_name: &str, fallback_tone: &str) -> NormalizedReply {
    let payload = Payload::new(raw);

    let text = ReplyShape::ORDER
        .iter()
        .find_map(|shape| shape.extract(&payload))
        .unwrap_or_default();

    let meta = payload.metadata();
    let field = |name: &str| meta.and_then(|m| m.get(name));

    NormalizedReply {
        text,
        agent_name: field("agent_name")
            .and_then(non_empty_str)
            .unwrap_or_else(|| fallback_name.to_string()),
        confidence: field("confidence")
            .and_then(Value::as_f64)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.0),
        tone: field("tone")
            .and_then(non_empty_str)
            .unwrap_or_else(|| fallback_tone.to_string()),
        references: field("references").map(clean_references).unwrap_or_default(),
    }
}

fn result_object(value: &Value) -> Option<&Map<String, Value>> {
    value.get("result").and_then(Value::as_object)
}

fn first_text(map: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(text_str))
}

/// Reply text is kept verbatim; blank text counts as absent
fn reply_text(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}

fn text_str(value: &Value) -> Option<String> {
    value.as_str().and_then(reply_text)
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().and_then(non_empty)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Keep only non-blank string entries; anything else is dropped silently
fn clean_references(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(non_empty_str).collect())
        .unwrap_or_default()
}
