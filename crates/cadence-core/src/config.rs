//! Configuration loading and typed config structures for the scheduler host.
//!
//! The canonical configuration lives in `cadence-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file. Every
//! field has a default, so a missing or partial file degrades gracefully.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level host configuration.
///
/// Mirrors the structure of `cadence-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// Tick loop pacing and bounds.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-queue pass budgets.
    #[serde(default)]
    pub queues: QueueBudgetsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Demo workload parameters.
    #[serde(default)]
    pub workload: WorkloadConfig,
}

impl SchedulerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty or whitespace-only document yields the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }
}

/// Tick loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum number of ticks before the host stops (0 = unlimited).
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: default_max_ticks(),
        }
    }
}

/// Per-queue pass budgets, in microseconds.
///
/// Two urgency classes: `standard` for latency-sensitive work serviced on
/// every tick, `background` for bulk work that tolerates longer passes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueBudgetsConfig {
    /// Pass budget of the standard queue, in microseconds.
    #[serde(default = "default_standard_budget_us")]
    pub standard_budget_us: u64,

    /// Pass budget of the background queue, in microseconds.
    #[serde(default = "default_background_budget_us")]
    pub background_budget_us: u64,
}

impl QueueBudgetsConfig {
    /// The standard queue's pass budget as a [`Duration`].
    pub const fn standard_budget(&self) -> Duration {
        Duration::from_micros(self.standard_budget_us)
    }

    /// The background queue's pass budget as a [`Duration`].
    pub const fn background_budget(&self) -> Duration {
        Duration::from_micros(self.background_budget_us)
    }
}

impl Default for QueueBudgetsConfig {
    fn default() -> Self {
        Self {
            standard_budget_us: default_standard_budget_us(),
            background_budget_us: default_background_budget_us(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Demo workload parameters for the host binary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkloadConfig {
    /// Width of the generated obstacle grid, in cells.
    #[serde(default = "default_grid_width")]
    pub grid_width: u32,

    /// Height of the generated obstacle grid, in cells.
    #[serde(default = "default_grid_height")]
    pub grid_height: u32,

    /// Probability that a generated cell is blocked.
    #[serde(default = "default_obstacle_density")]
    pub obstacle_density: f64,

    /// Number of terrain chunks streamed by the chunk job.
    #[serde(default = "default_chunk_count")]
    pub chunk_count: u32,

    /// Random seed for reproducible workload generation.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            grid_width: default_grid_width(),
            grid_height: default_grid_height(),
            obstacle_density: default_obstacle_density(),
            chunk_count: default_chunk_count(),
            seed: default_seed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    16
}

const fn default_max_ticks() -> u64 {
    600
}

const fn default_standard_budget_us() -> u64 {
    2_000
}

const fn default_background_budget_us() -> u64 {
    4_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_grid_width() -> u32 {
    64
}

const fn default_grid_height() -> u32 {
    64
}

const fn default_obstacle_density() -> f64 {
    0.2
}

const fn default_chunk_count() -> u32 {
    6
}

const fn default_seed() -> u64 {
    42
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert_eq!(config.engine.tick_interval_ms, 16);
        assert_eq!(config.engine.max_ticks, 600);
        assert_eq!(config.queues.standard_budget_us, 2_000);
        assert_eq!(config.queues.background_budget_us, 4_000);
        assert_eq!(config.workload.seed, 42);
    }

    #[test]
    fn budgets_convert_to_durations() {
        let config = SchedulerConfig::default();
        assert_eq!(
            config.queues.standard_budget(),
            Duration::from_micros(2_000)
        );
        assert_eq!(
            config.queues.background_budget(),
            Duration::from_micros(4_000)
        );
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
engine:
  tick_interval_ms: 8
  max_ticks: 100

queues:
  standard_budget_us: 1500
  background_budget_us: 6000

logging:
  level: debug

workload:
  grid_width: 32
  grid_height: 24
  obstacle_density: 0.35
  chunk_count: 4
  seed: 7
";
        let config = SchedulerConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.engine.tick_interval_ms, 8);
        assert_eq!(config.engine.max_ticks, 100);
        assert_eq!(config.queues.standard_budget_us, 1500);
        assert_eq!(config.queues.background_budget_us, 6000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.workload.grid_width, 32);
        assert_eq!(config.workload.grid_height, 24);
        assert_eq!(config.workload.chunk_count, 4);
        assert_eq!(config.workload.seed, 7);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "engine:\n  max_ticks: 5\n";
        let config = SchedulerConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        // The override applies
        assert_eq!(config.engine.max_ticks, 5);
        // Everything else uses defaults
        assert_eq!(config.engine.tick_interval_ms, 16);
        assert_eq!(config.queues.standard_budget_us, 2_000);
    }

    #[test]
    fn parse_empty_yaml() {
        let config = SchedulerConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("cadence-config.yaml");
        if path.exists() {
            let config = SchedulerConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
