use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

use crate::transcript::TranscriptEntry;

/// Workspace key used when no workspace path is known.
pub const DEFAULT_WORKSPACE_KEY: &str = "__default__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRef {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// An agent run as reported by the session store. Read-only from the
/// console's point of view; replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub agents: Vec<AgentRef>,
    #[serde(default)]
    pub log: Vec<TranscriptEntry>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            updated_at: None,
            agents: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn with_log(mut self, log: Vec<TranscriptEntry>) -> Self {
        self.log = log;
        self
    }

    /// First line of the first user message, for list rows.
    pub fn title(&self) -> Option<String> {
        self.log
            .iter()
            .find(|e| e.role == "user")
            .and_then(|e| e.text())
            .and_then(|t| t.lines().next().map(|l| l.trim().to_string()))
            .filter(|t| !t.is_empty())
    }

    /// Time since the last update, if the timestamp parses.
    pub fn age(&self, now: chrono::DateTime<chrono::Utc>) -> Option<Duration> {
        let stamp = self.updated_at.as_deref().or(self.created_at.as_deref())?;
        let at = chrono::DateTime::parse_from_rfc3339(stamp).ok()?;
        (now - at.with_timezone(&chrono::Utc)).to_std().ok()
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d", secs / 86_400)
    }
}

/// Normalise a workspace path into the key that scopes polls and persisted
/// selection. Absent or blank paths map to [`DEFAULT_WORKSPACE_KEY`].
pub fn workspace_key(path: Option<&str>) -> String {
    let trimmed = path
        .map(|p| {
            p.trim_start()
                .trim_end_matches(|c: char| c == '/' || c == '\\' || c.is_whitespace())
        })
        .unwrap_or_default();
    if trimmed.is_empty() {
        // A bare "/" trims to nothing but is still a real path.
        match path.map(str::trim) {
            Some(p) if !p.is_empty() => p[..1].to_string(),
            _ => DEFAULT_WORKSPACE_KEY.to_string(),
        }
    } else {
        trimmed.to_string()
    }
}

/// Storage key holding the persisted selection for a workspace.
pub fn selection_storage_key(workspace_key: &str) -> String {
    format!("selection:{workspace_key}")
}

/// 16-char hex digest of a storage key, safe to use as a file name.
pub fn key_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
