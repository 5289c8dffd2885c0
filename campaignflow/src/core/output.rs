//! Stage payload type.

use super::OutputKind;
use serde::{Deserialize, Serialize};

/// The output produced by a succeeded stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum StagePayload {
    /// Parsed JSON data.
    Structured(serde_json::Value),
    /// Free text.
    Document(String),
}

impl StagePayload {
    /// Returns the output kind of this payload.
    #[must_use]
    pub fn kind(&self) -> OutputKind {
        match self {
            Self::Structured(_) => OutputKind::Structured,
            Self::Document(_) => OutputKind::Document,
        }
    }

    /// Converts the payload into the value stored in the pipeline context.
    #[must_use]
    pub fn to_context_value(&self) -> serde_json::Value {
        match self {
            Self::Structured(value) => value.clone(),
            Self::Document(text) => serde_json::Value::String(text.clone()),
        }
    }

    /// Returns the payload as display text.
    ///
    /// Structured payloads are pretty-printed.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Self::Document(text) => text.clone(),
        }
    }

    /// Returns the structured value, if any.
    #[must_use]
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Document(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_kind() {
        assert_eq!(StagePayload::Structured(json!({})).kind(), OutputKind::Structured);
        assert_eq!(StagePayload::Document("x".into()).kind(), OutputKind::Document);
    }

    #[test]
    fn test_context_value() {
        let payload = StagePayload::Document("hello".to_string());
        assert_eq!(payload.to_context_value(), json!("hello"));

        let payload = StagePayload::Structured(json!({"a": 1}));
        assert_eq!(payload.to_context_value(), json!({"a": 1}));
        assert_eq!(payload.as_structured(), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_payload_serialization() {
        let payload = StagePayload::Structured(json!({"channels": ["email"]}));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, json!({"kind": "structured", "value": {"channels": ["email"]}}));
    }
}
