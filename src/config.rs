//! Scheduler configuration loading from environment variables or a TOML file.
//!
//! All configuration values are loaded from `GG_SCHED_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GG_SCHED_WORKERS` | 0 | Worker count (0 = one per CPU) |
//! | `GG_SCHED_MAX_QUEUE_SIZE` | 256 | Max waiting submissions |
//! | `GG_SCHED_BLOCK_WHEN_FULL` | false | Block submitters instead of rejecting |
//! | `GG_SCHED_RETRY_BASE_MS` | 1000 | Backoff base delay (ms) |
//! | `GG_SCHED_RETRY_MAX_MS` | 60000 | Backoff ceiling (ms) |
//! | `GG_SCHED_PROGRESS_BUFFER` | 16 | Progress values buffered per task |
//! | `GG_SCHED_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `GG_SCHED_LOG_LEVEL` | info | `EnvFilter` directive for [`init_logging`](crate::telemetry::init_logging) |
//! | `GG_SCHED_LOG_FORMAT` | json | `json`, `pretty` or `compact` |
//! | `GG_SCHED_LOG_FILE` | unset | Log file path (stderr when unset) |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::{QueueFullPolicy, RetryPolicy, SchedulerConfig, MIN_PROGRESS_BUFFER};
use crate::telemetry::{LogConfig, LogError, LogFormat};

const DEFAULT_SHUTDOWN_SECS: u64 = 30;

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub workers: usize,
    pub max_queue_size: usize,
    pub block_when_full: bool,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub progress_buffer: usize,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub rate_limits: HashMap<String, f64>,
}

/// All scheduler configuration.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub scheduler: SchedulerConfig,
    pub logging: LogConfig,
    /// `task_type -> tokens_per_second`.
    pub rate_limits: HashMap<String, f64>,
}

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid logging settings: {0}")]
    Log(#[from] LogError),
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Logging settings from `GG_SCHED_LOG_*`. A bad format or level keeps
/// the default.
fn log_config_from_env() -> LogConfig {
    let defaults = LogConfig::default();
    let format = match std::env::var("GG_SCHED_LOG_FORMAT") {
        Ok(raw) => raw.parse::<LogFormat>().unwrap_or(defaults.format),
        Err(_) => defaults.format,
    };
    let level = match std::env::var("GG_SCHED_LOG_LEVEL") {
        Ok(raw) => {
            let candidate = LogConfig { level: raw, ..LogConfig::default() };
            if candidate.filter().is_ok() {
                candidate.level
            } else {
                defaults.level
            }
        }
        Err(_) => defaults.level,
    };
    let output_path = std::env::var_os("GG_SCHED_LOG_FILE")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    LogConfig { format, level, output_path }
}

fn policy_for(block_when_full: bool) -> QueueFullPolicy {
    if block_when_full {
        QueueFullPolicy::Block
    } else {
        QueueFullPolicy::Reject
    }
}

/// Build a retry policy, keeping the ceiling at or above the base.
fn retry_policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
    let base_ms = base_ms.max(1);
    let max_ms = max_ms.max(base_ms);
    RetryPolicy::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let defaults = SchedulerConfig::default();
    let workers = parse_usize("GG_SCHED_WORKERS", defaults.workers);
    let max_queue_size = parse_usize("GG_SCHED_MAX_QUEUE_SIZE", defaults.max_queue_size).max(1);
    let block = parse_bool("GG_SCHED_BLOCK_WHEN_FULL", false);
    let base_ms = parse_u64("GG_SCHED_RETRY_BASE_MS", 1000);
    let max_ms = parse_u64("GG_SCHED_RETRY_MAX_MS", 60_000);
    let progress_buffer =
        parse_usize("GG_SCHED_PROGRESS_BUFFER", defaults.progress_buffer).max(MIN_PROGRESS_BUFFER);
    let shutdown_secs = parse_u64("GG_SCHED_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_SECS).max(1);

    EnvConfig {
        scheduler: SchedulerConfig {
            workers,
            max_queue_size,
            queue_full_policy: policy_for(block),
            retry: retry_policy(base_ms, max_ms),
            progress_buffer,
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        },
        logging: log_config_from_env(),
        rate_limits: HashMap::new(),
    }
}

/// On-disk layout. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    workers: Option<usize>,
    max_queue_size: Option<usize>,
    block_when_full: Option<bool>,
    retry_base_ms: Option<u64>,
    retry_max_ms: Option<u64>,
    retry_jitter: Option<f64>,
    progress_buffer: Option<usize>,
    shutdown_timeout_secs: Option<u64>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
    log_file: Option<PathBuf>,
    rate_limits: HashMap<String, f64>,
}

/// Parse configuration from a TOML string.
pub fn from_toml_str(raw: &str) -> Result<EnvConfig, ConfigError> {
    let file: FileConfig = toml::from_str(raw)?;
    let defaults = SchedulerConfig::default();

    let base_ms = file.retry_base_ms.unwrap_or(1000);
    let max_ms = file.retry_max_ms.unwrap_or(60_000);
    let mut retry = retry_policy(base_ms, max_ms);
    if let Some(jitter) = file.retry_jitter {
        retry = retry.with_jitter(jitter);
    }

    let rate_limits = file
        .rate_limits
        .into_iter()
        .filter(|(task_type, rate)| {
            let valid = rate.is_finite() && *rate > 0.0;
            if !valid {
                tracing::warn!(task_type = %task_type, rate, "ignoring invalid rate limit");
            }
            valid
        })
        .collect();

    let defaults_log = LogConfig::default();
    let logging = LogConfig {
        format: file.log_format.unwrap_or(defaults_log.format),
        level: file.log_level.unwrap_or(defaults_log.level),
        output_path: file.log_file,
    };
    logging.filter()?;

    Ok(EnvConfig {
        scheduler: SchedulerConfig {
            workers: file.workers.unwrap_or(defaults.workers),
            max_queue_size: file.max_queue_size.unwrap_or(defaults.max_queue_size).max(1),
            queue_full_policy: policy_for(file.block_when_full.unwrap_or(false)),
            retry,
            progress_buffer: file
                .progress_buffer
                .unwrap_or(defaults.progress_buffer)
                .max(MIN_PROGRESS_BUFFER),
            shutdown_timeout: Duration::from_secs(
                file.shutdown_timeout_secs.unwrap_or(DEFAULT_SHUTDOWN_SECS).max(1),
            ),
        },
        logging,
        rate_limits,
    })
}

/// Load configuration from a TOML file.
pub fn load_file(path: impl AsRef<Path>) -> Result<EnvConfig, ConfigError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    from_toml_str(&raw)
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            workers: self.scheduler.effective_workers(),
            max_queue_size: self.scheduler.max_queue_size,
            block_when_full: self.scheduler.queue_full_policy == QueueFullPolicy::Block,
            retry_base_ms: self.scheduler.retry.base_delay.as_millis() as u64,
            retry_max_ms: self.scheduler.retry.max_delay.as_millis() as u64,
            progress_buffer: self.scheduler.progress_buffer,
            shutdown_timeout_secs: self.scheduler.shutdown_timeout.as_secs(),
            log_level: self.logging.level.clone(),
            log_format: self.logging.format,
            rate_limits: self.rate_limits.clone(),
        }
    }
}
