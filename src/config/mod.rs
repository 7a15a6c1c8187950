//! Layered runtime configuration (spec.md §4.6's ambient config concern).
//!
//! Grounded on the teacher's own figment setup (`src/config.rs`):
//! compiled-in defaults, overridden by an optional TOML file, overridden
//! by `KORREL8R_`-prefixed environment variables with `__` for nested
//! keys (e.g. `KORREL8R_ENGINE__WORKER_CONCURRENCY=4`).

pub mod rules;

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::store::RetryPolicy;

/// Top-level configuration document (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSettings,
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// The serde-friendly mirror of [`EngineConfig`] — `EngineConfig` holds a
/// `Duration` and a [`RetryPolicy`] directly, which this flattens into
/// plain numeric fields so the TOML/env layers stay simple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub worker_concurrency: usize,
    pub per_query_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_millis: u64,
    pub retry_cap_millis: u64,
    pub max_goal_chain: usize,
    pub total_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        EngineSettings {
            worker_concurrency: defaults.worker_concurrency,
            per_query_timeout_secs: defaults.per_query_timeout.as_secs(),
            retry_max_attempts: defaults.retry_policy.max_attempts,
            retry_base_millis: defaults.retry_policy.base.as_millis() as u64,
            retry_cap_millis: defaults.retry_policy.cap.as_millis() as u64,
            max_goal_chain: defaults.max_goal_chain,
            total_timeout_secs: defaults.total_timeout.as_secs(),
        }
    }
}

impl EngineSettings {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_concurrency: self.worker_concurrency.max(1),
            per_query_timeout: Duration::from_secs(self.per_query_timeout_secs),
            retry_policy: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                base: Duration::from_millis(self.retry_base_millis),
                cap: Duration::from_millis(self.retry_cap_millis),
            },
            max_goal_chain: self.max_goal_chain,
            total_timeout: Duration::from_secs(self.total_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// A `tracing_subscriber::EnvFilter` directive string, e.g. `"info"`
    /// or `"korrel8r=debug,tower=warn"`.
    pub filter: String,
    /// Emit newline-delimited JSON instead of human-readable text
    /// (spec.md's ambient logging concern — useful when the engine is
    /// embedded in a service rather than run interactively).
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Build the layered configuration: compiled defaults, then
    /// `path` if given and present, then `KORREL8R_`-prefixed env vars.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("KORREL8R_").split("__"));
        Ok(figment.extract()?)
    }
}
