//! Engine configuration
//!
//! Defaults can be overridden from `LUDICS_*` environment variables.

use serde::{Deserialize, Serialize};

/// How the compiler partitions a move log into design pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopingStrategy {
    /// One unscoped Proponent/Opponent pair
    #[default]
    Legacy,
    /// One pair per root topic of each move's target
    Topic,
    /// One pair per raw target key
    Argument,
}

impl ScopingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopingStrategy::Legacy => "legacy",
            ScopingStrategy::Topic => "topic",
            ScopingStrategy::Argument => "argument",
        }
    }
}

impl std::fmt::Display for ScopingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(ScopingStrategy::Legacy),
            "topic" => Ok(ScopingStrategy::Topic),
            "argument" => Ok(ScopingStrategy::Argument),
            other => Err(format!("unknown scoping strategy: {other}")),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum pairs a traversal may match before stopping unfinished
    pub default_fuel: usize,
    /// Acts written per appender call during compilation
    pub compile_batch_size: usize,
    /// Wait before re-resolving designs when a trace write loses its designs
    pub trace_retry_backoff_ms: u64,
    /// Reject adjacent same-polarity acts at append time
    pub enforce_alternation: bool,
    /// Scoping used when a compile call does not name one
    pub default_scoping: ScopingStrategy,
    /// Events retained by the bus history
    pub event_history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_fuel: 2048,
            compile_batch_size: 100,
            trace_retry_backoff_ms: 150,
            enforce_alternation: false,
            default_scoping: ScopingStrategy::Legacy,
            event_history_capacity: 512,
        }
    }
}

fn env_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl EngineConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LUDICS_FUEL") {
            if let Ok(n) = val.parse() {
                config.default_fuel = n;
            }
        }
        if let Ok(val) = std::env::var("LUDICS_COMPILE_BATCH") {
            if let Ok(n) = val.parse::<usize>() {
                config.compile_batch_size = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("LUDICS_TRACE_BACKOFF_MS") {
            if let Ok(n) = val.parse() {
                config.trace_retry_backoff_ms = n;
            }
        }
        if let Ok(val) = std::env::var("LUDICS_ENFORCE_ALTERNATION") {
            config.enforce_alternation = env_flag(&val);
        }
        if let Ok(val) = std::env::var("LUDICS_SCOPING") {
            if let Ok(s) = val.parse() {
                config.default_scoping = s;
            }
        }
        if let Ok(val) = std::env::var("LUDICS_EVENT_HISTORY") {
            if let Ok(n) = val.parse() {
                config.event_history_capacity = n;
            }
        }

        config
    }

    /// Backoff as a `Duration`
    pub fn trace_retry_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.trace_retry_backoff_ms)
    }
}
