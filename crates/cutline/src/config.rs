use std::time::Duration;

use cutline_types::StrategyKind;

use crate::error::ConfigError;

pub const STRATEGY_ENV: &str = "CUTLINE_STRATEGY";
pub const CHANNEL_CAPACITY_ENV: &str = "CUTLINE_CHANNEL_CAPACITY";
pub const REPORT_TIMEOUT_ENV: &str = "CUTLINE_REPORT_TIMEOUT_MS";

pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Knobs shared by every process of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutlineConfig {
    /// Fixed for the whole cluster; processes never mix algorithms.
    pub strategy: StrategyKind,
    pub channel_capacity: usize,
    /// How long the reporter waits for every process to complete.
    pub report_timeout: Duration,
}

impl Default for CutlineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
        }
    }
}

impl CutlineConfig {
    /// Defaults overridden by `CUTLINE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(STRATEGY_ENV) {
            config.strategy = raw.parse().map_err(|e: cutline_types::UnknownStrategyKind| {
                invalid(STRATEGY_ENV, &raw, e.to_string())
            })?;
        }

        if let Some(raw) = lookup(CHANNEL_CAPACITY_ENV) {
            let capacity: usize = raw
                .trim()
                .parse()
                .map_err(|e| invalid(CHANNEL_CAPACITY_ENV, &raw, format!("{e}")))?;
            config.channel_capacity = capacity;
        }

        if let Some(raw) = lookup(REPORT_TIMEOUT_ENV) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e| invalid(REPORT_TIMEOUT_ENV, &raw, format!("{e}")))?;
            config.report_timeout = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidEnv {
        key: key.to_owned(),
        value: value.to_owned(),
        reason,
    }
}
