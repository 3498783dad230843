// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_CONFIG_PATH: &str = "FOOTFALL_CONFIG_PATH";
pub const ENV_SOURCE_URL: &str = "FOOTFALL_SOURCE_URL";
pub const ENV_SOURCE_TOKEN: &str = "FOOTFALL_SOURCE_TOKEN";
pub const ENV_CADENCE_MINUTES: &str = "FOOTFALL_CADENCE_MINUTES";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "FOOTFALL_FETCH_TIMEOUT_SECS";

fn default_cadence_minutes() -> i64 {
    crate::model::DEFAULT_CADENCE_MINUTES
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_synthetic_seed() -> u64 {
    0x5eed
}
fn default_refresh_capacity() -> usize {
    256
}
fn default_session_capacity() -> usize {
    crate::pipeline::DEFAULT_SESSION_CAPACITY
}
fn default_max_window_days() -> i64 {
    crate::pipeline::DEFAULT_MAX_WINDOW_DAYS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL of the sensor platform API. `None` → only synthetic data.
    #[serde(default)]
    pub source_url: Option<String>,
    /// Bearer token. "ENV" means: read from FOOTFALL_SOURCE_TOKEN.
    #[serde(default)]
    pub source_token: Option<String>,
    /// Raw sampling cadence of the sensors, in minutes.
    #[serde(default = "default_cadence_minutes")]
    pub cadence_minutes: i64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_synthetic_seed")]
    pub synthetic_seed: u64,
    /// Sessions tracked by the last-updated store.
    #[serde(default = "default_refresh_capacity")]
    pub refresh_capacity: usize,
    /// Concurrent dashboard sessions kept in memory.
    #[serde(default = "default_session_capacity")]
    pub session_capacity: usize,
    /// Longest accepted request window.
    #[serde(default = "default_max_window_days")]
    pub max_window_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            source_token: None,
            cadence_minutes: default_cadence_minutes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            synthetic_seed: default_synthetic_seed(),
            refresh_capacity: default_refresh_capacity(),
            session_capacity: default_session_capacity(),
            max_window_days: default_max_window_days(),
        }
    }
}

impl PipelineConfig {
    pub fn cadence(&self) -> Duration {
        Duration::minutes(self.cadence_minutes)
    }

    pub fn max_window(&self) -> Duration {
        Duration::days(self.max_window_days)
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Parse TOML content, then sanitize.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $FOOTFALL_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let pb = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
            if pb.exists() {
                Self::load_from_file(&pb)?
            } else {
                Self::default()
            }
        };
        base.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = env::var(ENV_SOURCE_URL) {
            let url = url.trim().to_string();
            self.source_url = (!url.is_empty()).then_some(url);
        }
        if let Some(m) = env::var(ENV_CADENCE_MINUTES)
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
        {
            self.cadence_minutes = m;
        }
        if let Some(t) = env::var(ENV_FETCH_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.fetch_timeout_secs = t;
        }

        // Resolve token if "ENV", or take it from env when the file has none
        let wants_env = self
            .source_token
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("env"));
        if wants_env {
            self.source_token = Some(
                env::var(ENV_SOURCE_TOKEN)
                    .map_err(|_| anyhow!("Missing {ENV_SOURCE_TOKEN} env var"))?,
            );
        } else if self.source_token.is_none() {
            self.source_token = env::var(ENV_SOURCE_TOKEN).ok();
        }

        Ok(self.sanitized())
    }

    fn sanitized(mut self) -> Self {
        if self.cadence_minutes < 1 {
            self.cadence_minutes = default_cadence_minutes();
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = default_fetch_timeout_secs();
        }
        if self.refresh_capacity == 0 {
            self.refresh_capacity = default_refresh_capacity();
        }
        if self.session_capacity == 0 {
            self.session_capacity = default_session_capacity();
        }
        if self.max_window_days < 1 {
            self.max_window_days = default_max_window_days();
        }
        self
    }
}
