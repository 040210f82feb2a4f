//! Configuration loaded from `photobatch.toml`.
//!
//! Every field is optional and falls back to a default. The
//! `PHOTOBATCH_API_KEY` environment variable takes precedence over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "photobatch.toml";
pub const API_KEY_ENV: &str = "PHOTOBATCH_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct PhotobatchConfig {
    /// Image-generation endpoint receiving one POST per job.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token; overridden by `PHOTOBATCH_API_KEY`.
    #[serde(default)]
    pub api_key: String,

    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ceiling on in-flight calls for bounded features.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// JSON file holding the history ring buffer.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Entries kept before the oldest is evicted.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Prefix for exported file names.
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,

    /// Interval for the estimated progress ramp, in milliseconds.
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
}

// Default endpoint: a local image service.
fn default_endpoint() -> String {
    "http://localhost:8080/v1/images/generate".to_string()
}

// Default model: "image-edit-1".
fn default_model() -> String {
    "image-edit-1".to_string()
}

// Default ceiling for bounded features: 3.
fn default_max_concurrent() -> usize {
    3
}

// Default per-request timeout: 120s.
fn default_request_timeout_secs() -> u64 {
    120
}

// Default history file, relative to the working directory.
fn default_history_path() -> PathBuf {
    PathBuf::from(".photobatch/history.json")
}

// Default history capacity: 50 entries.
fn default_history_capacity() -> usize {
    50
}

// Default archive entry prefix: "photo".
fn default_export_prefix() -> String {
    "photo".to_string()
}

// Default progress tick: 500ms.
fn default_progress_tick_ms() -> u64 {
    500
}

impl Default for PhotobatchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            max_concurrent: default_max_concurrent(),
            request_timeout_secs: default_request_timeout_secs(),
            history_path: default_history_path(),
            history_capacity: default_history_capacity(),
            export_prefix: default_export_prefix(),
            progress_tick_ms: default_progress_tick_ms(),
        }
    }
}

impl PhotobatchConfig {
    /// Load from `path`, or `photobatch.toml` in the working directory.
    ///
    /// An explicit path must exist; the default file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        // The environment wins over the file for the API key.
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            config.api_key = key;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<PhotobatchConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }
}
