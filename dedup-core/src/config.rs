use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use thiserror::Error;

use crate::output::DEFAULT_MAX_ROWS_PER_COLUMN;
use crate::retry::RetryPolicy;

#[derive(Envconfig, Clone, Debug)]
pub struct PipelineConfig {
    /// Keys per existence lookup request.
    #[envconfig(default = "100")]
    pub lookup_batch_size: usize,

    /// Items per insert request.
    #[envconfig(default = "25")]
    pub write_batch_size: usize,

    #[envconfig(default = "8")]
    pub max_concurrent_lookups: usize,

    #[envconfig(default = "4")]
    pub max_concurrent_writes: usize,

    /// Attempts per store request, the first one included.
    #[envconfig(default = "5")]
    pub max_write_attempts: u32,

    #[envconfig(default = "1000")]
    pub retry_initial_interval: EnvMsDuration,

    #[envconfig(default = "1")]
    pub retry_backoff_coefficient: u32,

    #[envconfig(default = "10000")]
    pub retry_maximum_interval: EnvMsDuration,

    #[envconfig(default = "6000000")]
    pub pipeline_timeout: EnvMsDuration,

    #[envconfig(default = "500000")]
    pub max_rows_per_column: usize,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("LOOKUP_BATCH_SIZE", self.lookup_batch_size),
            ("WRITE_BATCH_SIZE", self.write_batch_size),
            ("MAX_CONCURRENT_LOOKUPS", self.max_concurrent_lookups),
            ("MAX_CONCURRENT_WRITES", self.max_concurrent_writes),
            ("MAX_ROWS_PER_COLUMN", self.max_rows_per_column),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::MustBePositive(name));
            }
        }
        if self.max_write_attempts == 0 {
            return Err(ConfigError::MustBePositive("MAX_WRITE_ATTEMPTS"));
        }
        if self.retry_backoff_coefficient == 0 {
            return Err(ConfigError::MustBePositive("RETRY_BACKOFF_COEFFICIENT"));
        }
        // A zero timeout would fail every run before its first stage.
        if self.pipeline_timeout.0.is_zero() {
            return Err(ConfigError::MustBePositive("PIPELINE_TIMEOUT"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_write_attempts,
            self.retry_backoff_coefficient,
            self.retry_initial_interval.0,
            Some(self.retry_maximum_interval.0),
        )
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookup_batch_size: 100,
            write_batch_size: 25,
            max_concurrent_lookups: 8,
            max_concurrent_writes: 4,
            max_write_attempts: 5,
            retry_initial_interval: EnvMsDuration(time::Duration::from_secs(1)),
            retry_backoff_coefficient: 1,
            retry_maximum_interval: EnvMsDuration(time::Duration::from_secs(10)),
            pipeline_timeout: EnvMsDuration(time::Duration::from_secs(6000)),
            max_rows_per_column: DEFAULT_MAX_ROWS_PER_COLUMN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl std::fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("expected a duration in milliseconds")
    }
}

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
