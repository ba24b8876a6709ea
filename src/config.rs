//! Configuration for Timebook
//!
//! Layered as: defaults < TOML file < environment < command line. The command
//! line layer is applied by the binary through the `with_*` builders.

use crate::{Result, TimebookError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:2024";
pub const DEFAULT_ASSISTANT_ID: &str = "time_entry";
pub const DEFAULT_PROJECTS_API_URL: &str = "http://localhost:5008";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_API_URL: &str = "TIMEBOOK_API_URL";
pub const ENV_ASSISTANT_ID: &str = "TIMEBOOK_ASSISTANT_ID";
pub const ENV_PROJECTS_URL: &str = "TIMEBOOK_PROJECTS_URL";

/// Configuration for Timebook
#[derive(Debug, Clone, PartialEq)]
pub struct TimebookConfig {
    /// Base URL of the agent runtime
    pub api_url: String,

    /// Graph / assistant to run on the agent runtime
    pub assistant_id: String,

    /// Base URL of the project lookup service used by the edit form
    pub projects_api_url: String,

    /// Client listed first in project groupings
    pub pinned_client: Option<String>,

    /// Timeout for non-streaming requests
    pub request_timeout: Duration,

    /// JSONL file written by an external speech engine
    pub voice_events: Option<PathBuf>,

    /// JSONL file the speech engine reads start / stop / reset commands from
    pub voice_control: Option<PathBuf>,

    /// Log destination for TUI mode
    pub log_file: Option<PathBuf>,
}

/// On-disk shape of `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    assistant_id: Option<String>,
    projects_api_url: Option<String>,
    pinned_client: Option<String>,
    request_timeout_secs: Option<u64>,
    voice_events: Option<PathBuf>,
    voice_control: Option<PathBuf>,
    log_file: Option<PathBuf>,
}

impl Default for TimebookConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
            projects_api_url: DEFAULT_PROJECTS_API_URL.to_string(),
            pinned_client: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            voice_events: None,
            voice_control: None,
            log_file: None,
        }
    }
}

impl TimebookConfig {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`, then apply environment overrides.
    ///
    /// A missing default file is fine; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(TimebookError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_file(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `$XDG_CONFIG_HOME/timebook/config.toml` (or the platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("timebook").join("config.toml"))
    }

    /// Parse a TOML config file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(text)?;
        let defaults = Self::default();
        Ok(Self {
            api_url: file.api_url.unwrap_or(defaults.api_url),
            assistant_id: file.assistant_id.unwrap_or(defaults.assistant_id),
            projects_api_url: file.projects_api_url.unwrap_or(defaults.projects_api_url),
            pinned_client: file.pinned_client,
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            voice_events: file.voice_events,
            voice_control: file.voice_control,
            log_file: file.log_file,
        })
    }

    /// Apply environment overrides through `lookup` so tests need not touch
    /// the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(id) = non_empty(ENV_ASSISTANT_ID) {
            self.assistant_id = id;
        }
        if let Some(url) = non_empty(ENV_PROJECTS_URL) {
            self.projects_api_url = url;
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_assistant_id(mut self, id: impl Into<String>) -> Self {
        self.assistant_id = id.into();
        self
    }

    pub fn with_projects_api_url(mut self, url: impl Into<String>) -> Self {
        self.projects_api_url = url.into();
        self
    }

    pub fn with_pinned_client(mut self, client: Option<String>) -> Self {
        self.pinned_client = client;
        self
    }

    pub fn with_voice_events(mut self, path: PathBuf) -> Self {
        self.voice_events = Some(path);
        self
    }

    pub fn with_voice_control(mut self, path: PathBuf) -> Self {
        self.voice_control = Some(path);
        self
    }

    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TimebookConfig::default();
        assert_eq!(config.api_url, "http://localhost:2024");
        assert_eq!(config.assistant_id, "time_entry");
        assert_eq!(config.projects_api_url, "http://localhost:5008");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TimebookConfig::from_toml(
            r#"
            api_url = "http://agent.internal:2024"
            pinned_client = "Intertech"
            request_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.api_url, "http://agent.internal:2024");
        assert_eq!(config.assistant_id, DEFAULT_ASSISTANT_ID);
        assert_eq!(config.pinned_client.as_deref(), Some("Intertech"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = TimebookConfig::from_toml("api_ur = \"typo\"").unwrap_err();
        assert!(matches!(err, TimebookError::Toml(_)));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "http://from-env:2024"),
            (ENV_PROJECTS_URL, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = TimebookConfig::default().with_projects_api_url("http://file:5008");
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_url, "http://from-env:2024");
        // Blank values do not override
        assert_eq!(config.projects_api_url, "http://file:5008");
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "assistant_id = \"booking\"\n").unwrap();

        let config = TimebookConfig::from_file(&path).unwrap();
        assert_eq!(config.assistant_id, "booking");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = TimebookConfig::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, TimebookError::Config(_)));
    }
}
