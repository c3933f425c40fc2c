//! Run configuration with precedence tracking.
//!
//! Every setting records where its value came from. Precedence, lowest to
//! highest:
//!
//! 1. Built-in defaults
//! 2. The `[run]` table of a TOML config file
//! 3. Environment variables (`STORYRUN_WORKERS`, `STORYRUN_STOP_ON_EXCEPTION`,
//!    `STORYRUN_DATE_ORDER`, `STORYRUN_LOG`)
//! 4. Explicit overrides
//!
//! ```toml
//! [run]
//! workers = 4
//! stop_on_exception = true
//! date_order = "day-first"
//! log_level = "info"
//! log_format = "json"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use storyrun_core::dates::DateOrder;

use crate::logging::{LogFormat, LogLevel};

/// Environment variable for the worker count.
pub const ENV_WORKERS: &str = "STORYRUN_WORKERS";
/// Environment variable for stop-on-exception.
pub const ENV_STOP_ON_EXCEPTION: &str = "STORYRUN_STOP_ON_EXCEPTION";
/// Environment variable for the slash-date field order.
pub const ENV_DATE_ORDER: &str = "STORYRUN_DATE_ORDER";
/// Environment variable for the log level.
pub const ENV_LOG: &str = "STORYRUN_LOG";

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting has an unusable value.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From the config file's `[run]` table.
    ConfigFile = 1,
    /// From an environment variable.
    EnvVar = 2,
    /// From an explicit override (highest precedence).
    Override = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }

    /// Replace the value when `source` has equal or higher precedence.
    fn set(&mut self, value: T, source: ConfigSource) {
        if source >= self.source {
            self.value = value;
            self.source = source;
        }
    }
}

// ============================================================================
// File Format
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    run: RunSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    workers: Option<usize>,
    stop_on_exception: Option<bool>,
    date_order: Option<DateOrder>,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
}

/// Explicit overrides (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub stop_on_exception: Option<bool>,
    pub date_order: Option<DateOrder>,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
}

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Resolved run configuration with precedence information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Worker threads used to run tests in parallel.
    pub workers: ConfigValue<usize>,
    /// Skip the remaining steps of a test after a step throws.
    pub stop_on_exception: ConfigValue<bool>,
    /// Field order for slash dates.
    pub date_order: ConfigValue<DateOrder>,
    pub log_level: ConfigValue<LogLevel>,
    pub log_format: ConfigValue<LogFormat>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        RunConfig {
            workers: ConfigValue::new(workers, ConfigSource::Default),
            stop_on_exception: ConfigValue::new(false, ConfigSource::Default),
            date_order: ConfigValue::new(DateOrder::default(), ConfigSource::Default),
            log_level: ConfigValue::new(LogLevel::default(), ConfigSource::Default),
            log_format: ConfigValue::new(LogFormat::default(), ConfigSource::Default),
        }
    }
}

impl RunConfig {
    /// Resolve configuration from all sources, reading the process environment.
    pub fn resolve(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        RunConfig::resolve_with_env(config_file, |key| std::env::var(key).ok(), overrides)
    }

    /// Resolve configuration from all sources with an explicit environment lookup.
    pub fn resolve_with_env<F>(
        config_file: Option<&Path>,
        env: F,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Defaults (lowest precedence)
        let mut config = RunConfig::default();

        if let Some(path) = config_file {
            config.apply_config_file(path)?;
        }

        config.apply_env(env)?;

        // Overrides (highest precedence)
        config.apply_overrides(overrides);

        config.validate()?;
        debug!(config = ?config, "resolved run configuration");
        Ok(config)
    }

    /// Apply the `[run]` table of the TOML file at `path`.
    pub fn apply_config_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply_config_text(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_config_text(&mut self, text: &str) -> Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;
        let run = file.run;
        let source = ConfigSource::ConfigFile;

        if let Some(workers) = run.workers {
            self.workers.set(workers, source);
        }
        if let Some(stop) = run.stop_on_exception {
            self.stop_on_exception.set(stop, source);
        }
        if let Some(order) = run.date_order {
            self.date_order.set(order, source);
        }
        if let Some(level) = run.log_level {
            self.log_level.set(level, source);
        }
        if let Some(format) = run.log_format {
            self.log_format.set(format, source);
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = ConfigSource::EnvVar;

        if let Some(text) = env(ENV_WORKERS) {
            let workers = text.trim().parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                key: ENV_WORKERS.to_string(),
                value: text.clone(),
                reason: e.to_string(),
            })?;
            self.workers.set(workers, source);
        }

        if let Some(text) = env(ENV_STOP_ON_EXCEPTION) {
            let stop = parse_flag(&text).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_STOP_ON_EXCEPTION.to_string(),
                value: text.clone(),
                reason: "expected true/false, 1/0, yes/no".to_string(),
            })?;
            self.stop_on_exception.set(stop, source);
        }

        if let Some(text) = env(ENV_DATE_ORDER) {
            let order = text
                .parse::<DateOrder>()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: ENV_DATE_ORDER.to_string(),
                    value: text.clone(),
                    reason,
                })?;
            self.date_order.set(order, source);
        }

        if let Some(text) = env(ENV_LOG) {
            let level = text
                .parse::<LogLevel>()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: ENV_LOG.to_string(),
                    value: text.clone(),
                    reason,
                })?;
            self.log_level.set(level, source);
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        let source = ConfigSource::Override;

        if let Some(workers) = overrides.workers {
            self.workers.set(workers, source);
        }
        if let Some(stop) = overrides.stop_on_exception {
            self.stop_on_exception.set(stop, source);
        }
        if let Some(order) = overrides.date_order {
            self.date_order.set(order, source);
        }
        if let Some(level) = overrides.log_level {
            self.log_level.set(level, source);
        }
        if let Some(format) = overrides.log_format {
            self.log_format.set(format, source);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.value == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers".to_string(),
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        |_| None
    }

    fn config_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    mod precedence {
        use super::*;

        #[test]
        fn defaults_when_nothing_is_set() {
            let config = RunConfig::resolve_with_env(None, no_env(), &Overrides::default()).unwrap();
            assert!(config.workers.value >= 1);
            assert_eq!(config.workers.source, ConfigSource::Default);
            assert!(!config.stop_on_exception.value);
            assert_eq!(config.date_order.value, DateOrder::MonthFirst);
            assert_eq!(config.log_level.value, LogLevel::Warn);
            assert_eq!(config.log_format.value, LogFormat::Text);
        }

        #[test]
        fn file_overrides_defaults() {
            let file = config_file(
                "[run]\nworkers = 3\nstop_on_exception = true\ndate_order = \"day-first\"\nlog_format = \"json\"\n",
            );
            let config =
                RunConfig::resolve_with_env(Some(file.path()), no_env(), &Overrides::default())
                    .unwrap();
            assert_eq!(config.workers, ConfigValue::new(3, ConfigSource::ConfigFile));
            assert!(config.stop_on_exception.value);
            assert_eq!(config.date_order.value, DateOrder::DayFirst);
            assert_eq!(config.log_format.value, LogFormat::Json);
            assert_eq!(config.log_level.source, ConfigSource::Default);
        }

        #[test]
        fn env_overrides_file() {
            let file = config_file("[run]\nworkers = 3\n");
            let env = env_of(&[(ENV_WORKERS, "5"), (ENV_LOG, "debug")]);
            let config =
                RunConfig::resolve_with_env(Some(file.path()), env, &Overrides::default()).unwrap();
            assert_eq!(config.workers, ConfigValue::new(5, ConfigSource::EnvVar));
            assert_eq!(config.log_level, ConfigValue::new(LogLevel::Debug, ConfigSource::EnvVar));
        }

        #[test]
        fn overrides_win() {
            let env = env_of(&[(ENV_WORKERS, "5"), (ENV_STOP_ON_EXCEPTION, "yes")]);
            let overrides = Overrides {
                workers: Some(2),
                stop_on_exception: Some(false),
                ..Overrides::default()
            };
            let config = RunConfig::resolve_with_env(None, env, &overrides).unwrap();
            assert_eq!(config.workers, ConfigValue::new(2, ConfigSource::Override));
            assert_eq!(
                config.stop_on_exception,
                ConfigValue::new(false, ConfigSource::Override)
            );
        }

        #[test]
        fn merge_prefers_higher_source() {
            let low = ConfigValue::new(1, ConfigSource::ConfigFile);
            let high = ConfigValue::new(2, ConfigSource::EnvVar);
            assert_eq!(low.clone().merge(high.clone()).value, 2);
            assert_eq!(high.merge(low).value, 2);
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn missing_file_is_io_error() {
            let err = RunConfig::resolve_with_env(
                Some(Path::new("/nonexistent/storyrun.toml")),
                no_env(),
                &Overrides::default(),
            )
            .unwrap_err();
            assert!(matches!(err, ConfigError::Io { .. }));
        }

        #[test]
        fn unknown_keys_are_rejected() {
            let file = config_file("[run]\nthreads = 4\n");
            let err =
                RunConfig::resolve_with_env(Some(file.path()), no_env(), &Overrides::default())
                    .unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
        }

        #[test]
        fn bad_env_values_name_the_variable() {
            let err = RunConfig::resolve_with_env(
                None,
                env_of(&[(ENV_DATE_ORDER, "sideways")]),
                &Overrides::default(),
            )
            .unwrap_err();
            match err {
                ConfigError::InvalidValue { key, value, .. } => {
                    assert_eq!(key, ENV_DATE_ORDER);
                    assert_eq!(value, "sideways");
                }
                other => panic!("unexpected: {:?}", other),
            }

            assert!(RunConfig::resolve_with_env(
                None,
                env_of(&[(ENV_STOP_ON_EXCEPTION, "maybe")]),
                &Overrides::default()
            )
            .is_err());
        }

        #[test]
        fn zero_workers_is_rejected() {
            let overrides = Overrides {
                workers: Some(0),
                ..Overrides::default()
            };
            let err = RunConfig::resolve_with_env(None, no_env(), &overrides).unwrap_err();
            assert!(err.to_string().contains("workers"));
        }
    }

    #[test]
    fn empty_file_keeps_defaults() {
        let file = config_file("");
        let config =
            RunConfig::resolve_with_env(Some(file.path()), no_env(), &Overrides::default()).unwrap();
        assert_eq!(config.workers.source, ConfigSource::Default);
    }
}
