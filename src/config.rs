//! Client configuration.
//!
//! Values come from built-in defaults, then an optional JSON file, then the
//! environment (a `.env` file is loaded by `main` before this runs).

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://projectgit-production.up.railway.app";

/// Epoch range accepted by the training endpoint.
pub const EPOCH_RANGE: std::ops::RangeInclusive<u32> = 1..=50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_epochs")]
    pub default_epochs: u32,
    #[serde(default)]
    pub poll: PollIntervals,
}

/// Sleep lengths for the training progress loop, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollIntervals {
    /// While the server reports training as running.
    #[serde(default = "default_running_ms")]
    pub running_ms: u64,
    /// While the server is neither running nor done.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// After a failed progress fetch.
    #[serde(default = "default_failure_ms")]
    pub failure_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_epochs() -> u32 {
    10
}

fn default_running_ms() -> u64 {
    800
}

fn default_idle_ms() -> u64 {
    2000
}

fn default_failure_ms() -> u64 {
    2000
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            running_ms: default_running_ms(),
            idle_ms: default_idle_ms(),
            failure_ms: default_failure_ms(),
        }
    }
}

impl PollIntervals {
    pub fn running(&self) -> Duration {
        Duration::from_millis(self.running_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn failure(&self) -> Duration {
        Duration::from_millis(self.failure_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_epochs: default_epochs(),
            poll: PollIntervals::default(),
        }
    }
}

impl ClientConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: ClientConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CHESS_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(url) = lookup("CHESS_API_URL") {
            self.base_url = url;
        }
        if let Some(epochs) = lookup("CHESS_DEFAULT_EPOCHS") {
            self.default_epochs = epochs
                .parse()
                .with_context(|| format!("CHESS_DEFAULT_EPOCHS is not a number: {}", epochs))?;
        }

        let intervals = [
            ("CHESS_POLL_RUNNING_MS", &mut self.poll.running_ms),
            ("CHESS_POLL_IDLE_MS", &mut self.poll.idle_ms),
            ("CHESS_POLL_FAILURE_MS", &mut self.poll.failure_ms),
        ];
        for (key, slot) in intervals {
            if let Some(value) = lookup(key) {
                *slot = value
                    .parse()
                    .with_context(|| format!("{} is not a number: {}", key, value))?;
            }
        }

        Ok(self)
    }

    /// Check the config and return the parsed base URL.
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Base URL must be http or https: {}", self.base_url);
        }
        if !EPOCH_RANGE.contains(&self.default_epochs) {
            anyhow::bail!(
                "default_epochs must be within {}..={}, got {}",
                EPOCH_RANGE.start(),
                EPOCH_RANGE.end(),
                self.default_epochs
            );
        }
        Ok(url)
    }
}
