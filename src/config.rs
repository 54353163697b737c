//! Engine configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `graphfilter.{toml,yaml,json}` in the working directory, then
//! `GRAPHFILTER__*` environment variables (e.g.
//! `GRAPHFILTER__QUERY_TIMEOUT_MS=5000`, `GRAPHFILTER__STORE__KIND=bolt`).

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::storage::BackendConfig;

const ENV_PREFIX: &str = "GRAPHFILTER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: BackendConfig,
    /// Per-query timeout in milliseconds. `0` disables it.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: BackendConfig::default(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Load from `graphfilter.*` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(File::with_name("graphfilter").required(false))
    }

    /// Load from a specific file, still letting the environment override it.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::build(File::with_name(path))
    }

    fn build<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Query timeout as a Duration, `None` when disabled.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }
}
