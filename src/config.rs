use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// History window requested at attach time, in entries. Entry-count based
/// rather than byte based: the seam de-duplication key is the per-entry
/// sequence number, so the truncation boundary stays aligned with it.
pub const DEFAULT_HISTORY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Client tunables. All fields have serde defaults so a partial TOML
/// document (or an empty one) yields a usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Max history entries replayed on attach.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Bound on metadata fetch and viewer join during connect.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on the history fetch.
    #[serde(default = "default_history_timeout_ms")]
    pub history_timeout_ms: u64,

    /// Per-subscriber event buffer. A subscriber falling further behind
    /// than this observes a gap (drop-oldest policy).
    #[serde(default = "default_mux_capacity")]
    pub mux_capacity: usize,

    /// Per-attachment input/control queue depth.
    #[serde(default = "default_relay_capacity")]
    pub relay_capacity: usize,

    /// Window for collapsing resize bursts at the surface boundary.
    #[serde(default = "default_resize_window_ms")]
    pub resize_window_ms: u64,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_history_timeout_ms() -> u64 {
    5000
}
fn default_mux_capacity() -> usize {
    256
}
fn default_relay_capacity() -> usize {
    64
}
fn default_resize_window_ms() -> u64 {
    100
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            connect_timeout_ms: default_connect_timeout_ms(),
            history_timeout_ms: default_history_timeout_ms(),
            mux_capacity: default_mux_capacity(),
            relay_capacity: default_relay_capacity(),
            resize_window_ms: default_resize_window_ms(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_millis(self.history_timeout_ms)
    }

    pub fn resize_window(&self) -> Duration {
        Duration::from_millis(self.resize_window_ms)
    }
}
