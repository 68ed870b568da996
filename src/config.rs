use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4000);
pub const DEFAULT_LOG_FILTER: &str = "warn";

const ENV_API_URL: &str = "TETHER_API_URL";
const ENV_POLL_INTERVAL_MS: &str = "TETHER_POLL_INTERVAL_MS";
const ENV_STATE_DIR: &str = "TETHER_STATE_DIR";
const ENV_LOG: &str = "TETHER_LOG";

/// Runtime settings, resolved from defaults, then the environment, then
/// command-line overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub poll_interval: Duration,
    pub state_dir: PathBuf,
    pub workspace_path: Option<String>,
    pub log_filter: Option<String>,
}

/// Flag values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub workspace: Option<String>,
    pub state_dir: Option<PathBuf>,
}

/// Default state directory: `~/.tether/`
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tether")
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let poll_interval = non_empty(ENV_POLL_INTERVAL_MS)
            .and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                _ => {
                    tracing::warn!(value = %raw, "ignoring invalid {ENV_POLL_INTERVAL_MS}");
                    None
                }
            })
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        Self {
            api_url: non_empty(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            poll_interval,
            state_dir: non_empty(ENV_STATE_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_state_dir),
            workspace_path: None,
            log_filter: non_empty(ENV_LOG),
        }
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(api_url) = overrides.api_url {
            self.api_url = api_url;
        }
        if let Some(workspace) = overrides.workspace {
            self.workspace_path = Some(workspace);
        }
        if let Some(state_dir) = overrides.state_dir {
            self.state_dir = state_dir;
        }
        self
    }

    /// Fill in the workspace from the current directory when none was given.
    pub fn with_default_workspace(mut self, cwd: &Path) -> Self {
        if self.workspace_path.is_none() {
            self.workspace_path = Some(cwd.to_string_lossy().to_string());
        }
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("tether.log")
    }
}
