//! Fleetpace Configuration
//!
//! This module provides configuration structures for the fleetpace
//! convergence scheduling daemon.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main fleetpace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetpaceConfig {
    /// Scheduling cadence configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Fleet-control command configuration
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduling cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Time for one full convergence pass over the fleet, in seconds
    #[serde(default = "default_run_interval_secs")]
    pub run_interval_secs: u64,

    /// How often fleet membership is re-probed, in seconds
    #[serde(default = "default_rediscover_interval_secs")]
    pub rediscover_interval_secs: u64,

    /// Wait between retries while the roster is empty, in seconds
    #[serde(default = "default_empty_roster_backoff_secs")]
    pub empty_roster_backoff_secs: u64,
}

/// Fleet-control command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Command that probes the fleet and prints a JSON object of
    /// `node -> liveness` on stdout
    #[serde(default = "default_probe_command")]
    pub probe_command: String,

    /// Command that triggers convergence on one node; `{node}` is
    /// replaced with the node identifier
    #[serde(default = "default_converge_command")]
    pub converge_command: String,

    /// Timeout for a single fleet command, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_run_interval_secs() -> u64 {
    3600
}

fn default_rediscover_interval_secs() -> u64 {
    600
}

fn default_empty_roster_backoff_secs() -> u64 {
    30
}

fn default_probe_command() -> String {
    "salt --static --out=json '*' test.ping".to_string()
}

fn default_converge_command() -> String {
    "salt --static --out=json {node} state.highstate".to_string()
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: default_run_interval_secs(),
            rediscover_interval_secs: default_rediscover_interval_secs(),
            empty_roster_backoff_secs: default_empty_roster_backoff_secs(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            probe_command: default_probe_command(),
            converge_command: default_converge_command(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl FleetpaceConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: FleetpaceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.scheduler.run_interval_secs == 0 {
            return Err(crate::Error::Config(
                "scheduler.run_interval_secs must be greater than zero".into(),
            ));
        }

        if self.scheduler.rediscover_interval_secs == 0 {
            return Err(crate::Error::Config(
                "scheduler.rediscover_interval_secs must be greater than zero".into(),
            ));
        }

        if self.fleet.probe_command.trim().is_empty() {
            return Err(crate::Error::Config(
                "fleet.probe_command cannot be empty".into(),
            ));
        }

        if self.fleet.converge_command.trim().is_empty() {
            return Err(crate::Error::Config(
                "fleet.converge_command cannot be empty".into(),
            ));
        }

        if !self.fleet.converge_command.contains("{node}") {
            return Err(crate::Error::Config(
                "fleet.converge_command must contain a {node} placeholder".into(),
            ));
        }

        Ok(())
    }

    /// Get the full-pass convergence period as Duration
    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.run_interval_secs)
    }

    /// Get the membership rediscovery period as Duration
    pub fn rediscover_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.rediscover_interval_secs)
    }

    /// Get the empty-roster backoff as Duration
    pub fn empty_roster_backoff(&self) -> Duration {
        Duration::from_secs(self.scheduler.empty_roster_backoff_secs)
    }

    /// Get the fleet command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.fleet.command_timeout_secs)
    }
}
