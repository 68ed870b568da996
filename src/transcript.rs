//! Transcript entries and the logic that keeps a rendered transcript stable
//! across polls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

mod reconcile;
mod signature;

pub use reconcile::reconcile;
pub use signature::{identity_of, signature_of};

/// One message or event in a session's append-only log.
///
/// Every field is lenient on input: the source may omit the id, the timestamp
/// or the payload, and identity falls back accordingly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TranscriptEntry {
    pub fn new(role: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            role: role.into(),
            payload,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Human-readable text carried by the payload, if it has any.
    ///
    /// Accepts a bare string payload, `{"text": ..}`, `{"content": ..}` where
    /// content is a string or an array of `{"text": ..}` parts.
    pub fn text(&self) -> Option<String> {
        use serde_json::Value;

        match &self.payload {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => {
                if let Some(Value::String(s)) = map.get("text") {
                    return Some(s.clone());
                }
                match map.get("content") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Array(parts)) => {
                        let texts: Vec<&str> = parts
                            .iter()
                            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                            .collect();
                        if texts.is_empty() {
                            None
                        } else {
                            Some(texts.join("\n"))
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// A rendered transcript. Entries are shared so that unchanged entries keep
/// their allocation (and therefore their pointer identity) across polls.
pub type Transcript = Arc<Vec<Arc<TranscriptEntry>>>;

pub fn empty_transcript() -> Transcript {
    Arc::new(Vec::new())
}

/// Signature of the last entry, used as the scroll controller's content key.
pub fn latest_key(transcript: &Transcript) -> Option<String> {
    transcript.last().map(|entry| signature_of(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_fields() {
        let entry: TranscriptEntry = serde_json::from_value(json!({
            "entryId": "e1",
            "role": "assistant",
            "payload": {"text": "hi"},
            "createdAt": "2024-05-01T10:00:00Z",
            "model": "opus"
        }))
        .unwrap();
        assert_eq!(entry.entry_id.as_deref(), Some("e1"));
        assert_eq!(entry.created_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(entry.model.as_deref(), Some("opus"));
    }

    #[test]
    fn deserializes_malformed_entry_with_defaults() {
        let entry: TranscriptEntry = serde_json::from_value(json!({})).unwrap();
        assert!(entry.entry_id.is_none());
        assert!(entry.role.is_empty());
        assert!(entry.payload.is_null());
    }

    #[test]
    fn text_from_string_payload() {
        let entry = TranscriptEntry::new("user", json!("hello"));
        assert_eq!(entry.text().as_deref(), Some("hello"));
    }

    #[test]
    fn text_from_content_parts() {
        let entry = TranscriptEntry::new(
            "assistant",
            json!({"content": [{"type": "text", "text": "a"}, {"type": "tool_use"}, {"text": "b"}]}),
        );
        assert_eq!(entry.text().as_deref(), Some("a\nb"));
    }

    #[test]
    fn text_absent_for_tool_payload() {
        let entry = TranscriptEntry::new("tool", json!({"name": "Write", "input": {}}));
        assert!(entry.text().is_none());
    }

    #[test]
    fn latest_key_tracks_last_entry() {
        let transcript: Transcript = Arc::new(vec![
            Arc::new(TranscriptEntry::new("user", json!("a")).with_id("1")),
            Arc::new(TranscriptEntry::new("assistant", json!("b")).with_id("2")),
        ]);
        assert_eq!(latest_key(&transcript), Some(signature_of(&transcript[1])));
        assert_eq!(latest_key(&empty_transcript()), None);
    }
}
