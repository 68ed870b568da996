use serde::Serialize;

use super::TranscriptEntry;

/// Fields that make up an entry's content signature, in serialization order.
#[derive(Serialize)]
struct SignatureFields<'a> {
    payload: &'a serde_json::Value,
    model: Option<&'a str>,
    role: &'a str,
    #[serde(rename = "createdAt")]
    created_at: Option<&'a str>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Stable identity key for an entry: `entryId`, else `createdAt`, else the
/// content signature. Never empty for entries that carry any content.
pub fn identity_of(entry: &TranscriptEntry) -> String {
    if let Some(id) = non_empty(entry.entry_id.as_deref()) {
        return id.to_string();
    }
    if let Some(ts) = non_empty(entry.created_at.as_deref()) {
        return ts.to_string();
    }
    signature_of(entry)
}

/// Structural signature of `{payload, model, role, createdAt}`. Only ever
/// compared for equality.
pub fn signature_of(entry: &TranscriptEntry) -> String {
    signature_with(entry, |fields| serde_json::to_string(fields))
}

fn signature_with<F>(entry: &TranscriptEntry, serialize: F) -> String
where
    F: FnOnce(&SignatureFields<'_>) -> Result<String, serde_json::Error>,
{
    let fields = SignatureFields {
        payload: &entry.payload,
        model: entry.model.as_deref(),
        role: &entry.role,
        created_at: entry.created_at.as_deref(),
    };
    match serialize(&fields) {
        Ok(signature) => signature,
        Err(err) => {
            tracing::debug!(error = %err, "signature serialization failed, using fallback key");
            fallback_signature(entry)
        }
    }
}

/// `<identity>-<createdAt>` using only the explicit identity fields, so the
/// fallback never recurses back into serialization.
fn fallback_signature(entry: &TranscriptEntry) -> String {
    let created_at = entry.created_at.as_deref().unwrap_or_default();
    let identity = non_empty(entry.entry_id.as_deref())
        .or(non_empty(entry.created_at.as_deref()))
        .unwrap_or_default();
    format!("{identity}-{created_at}")
}
