use anyhow::{Context, Result};
use ludics_engine::{EngineConfig, ScopingStrategy};
use serde::Deserialize;
use std::path::Path;

/// Engine settings read from a TOML file.
///
/// Every key is optional; a missing key keeps whatever the environment (or
/// the built-in default) already chose.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub default_fuel: Option<usize>,
    pub compile_batch_size: Option<usize>,
    pub trace_retry_backoff_ms: Option<u64>,
    pub enforce_alternation: Option<bool>,
    pub default_scoping: Option<ScopingStrategy>,
    pub event_history_capacity: Option<usize>,
}

impl ConfigFile {
    /// Load overrides from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        Self::parse(&content).context(format!("Failed to parse config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid engine config TOML")
    }

    /// Write every key present in the file over `config`.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(n) = self.default_fuel {
            config.default_fuel = n;
        }
        if let Some(n) = self.compile_batch_size {
            config.compile_batch_size = n.max(1);
        }
        if let Some(ms) = self.trace_retry_backoff_ms {
            config.trace_retry_backoff_ms = ms;
        }
        if let Some(on) = self.enforce_alternation {
            config.enforce_alternation = on;
        }
        if let Some(s) = self.default_scoping {
            config.default_scoping = s;
        }
        if let Some(n) = self.event_history_capacity {
            config.event_history_capacity = n;
        }
    }
}

/// Command-line flags that override the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagOverrides {
    pub fuel: Option<usize>,
    pub scoping: Option<ScopingStrategy>,
    pub enforce_alternation: bool,
}

/// Resolve the engine config: flags > file > `LUDICS_*` env > defaults.
pub fn load_engine_config(path: Option<&Path>, flags: &FlagOverrides) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env();
    if let Some(path) = path {
        ConfigFile::from_file(path)?.apply(&mut config);
    }
    if let Some(n) = flags.fuel {
        config.default_fuel = n;
    }
    if let Some(s) = flags.scoping {
        config.default_scoping = s;
    }
    if flags.enforce_alternation {
        config.enforce_alternation = true;
    }
    Ok(config)
}
