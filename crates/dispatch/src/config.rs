//! Startup configuration.
//!
//! All sections deserialize with `serde`, and every field has a default, so an external
//! loader may provide only the values it wants to override. The same values can be set in
//! code through [`DispatcherConfig::builder`].

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// What the dispatcher does when no route matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundPolicy {
    /// Answer with a fixed 404 and an empty body.
    #[default]
    FixedResponse,
    /// Raise a `RouteNotFound` error through the resolver chain.
    Raise,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sample every `interval`-th request past the threshold; must be a power of two.
    pub interval: u64,
    /// Requests below this count are always sampled; negative means always sample.
    pub min_threshold: i64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { interval: 8, min_threshold: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub core_threads: usize,
    pub max_threads: usize,
    pub queue_capacity: usize,
    pub idle_timeout_secs: u64,
    pub thread_name_prefix: String,
}

impl ExecutionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Requests admitted at once: running plus queued.
    pub fn capacity(&self) -> usize {
        self.max_threads.saturating_add(self.queue_capacity)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.core_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.core_threads > self.max_threads {
            return Err(ConfigError::CoreExceedsMax { core: self.core_threads, max: self.max_threads });
        }
        Ok(())
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            core_threads: 8,
            max_threads: 400,
            queue_capacity: 10_000,
            idle_timeout_secs: 60,
            thread_name_prefix: "nio-".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub not_found: NotFoundPolicy,
    pub sampling: SamplingConfig,
    pub execution: ExecutionConfig,
    /// The `code` reported in error bodies.
    pub error_code: i64,
    /// Largest aggregated request body accepted, in bytes.
    pub max_body_size: usize,
    /// Whether `/users` also matches `/users/`.
    pub use_trailing_slash_match: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            not_found: NotFoundPolicy::default(),
            sampling: SamplingConfig::default(),
            execution: ExecutionConfig::default(),
            error_code: 0,
            max_body_size: 1024 * 1024,
            use_trailing_slash_match: false,
        }
    }
}

impl DispatcherConfig {
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder { config: DispatcherConfig::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.execution.validate()
    }
}

#[derive(Debug)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl DispatcherConfigBuilder {
    #[must_use]
    pub fn not_found(mut self, policy: NotFoundPolicy) -> Self {
        self.config.not_found = policy;
        self
    }

    #[must_use]
    pub fn sampling(mut self, interval: u64, min_threshold: i64) -> Self {
        self.config.sampling = SamplingConfig { interval, min_threshold };
        self
    }

    #[must_use]
    pub fn execution(mut self, execution: ExecutionConfig) -> Self {
        self.config.execution = execution;
        self
    }

    #[must_use]
    pub fn error_code(mut self, error_code: i64) -> Self {
        self.config.error_code = error_code;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.max_body_size = max_body_size;
        self
    }

    #[must_use]
    pub fn use_trailing_slash_match(mut self, enabled: bool) -> Self {
        self.config.use_trailing_slash_match = enabled;
        self
    }

    pub fn build(self) -> Result<DispatcherConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker pool needs at least one core thread")]
    ZeroThreads,
    #[error("core threads {core} exceed max threads {max}")]
    CoreExceedsMax { core: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.not_found, NotFoundPolicy::FixedResponse);
        assert_eq!(config.sampling, SamplingConfig { interval: 8, min_threshold: 10_000 });
        assert_eq!(config.execution.core_threads, 8);
        assert_eq!(config.execution.max_threads, 400);
        assert_eq!(config.execution.queue_capacity, 10_000);
        assert_eq!(config.execution.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.execution.thread_name_prefix, "nio-");
        assert_eq!(config.execution.capacity(), 10_400);
        assert_eq!(config.error_code, 0);
    }

    #[test]
    fn partial_json() {
        let config: DispatcherConfig = serde_json::from_str(
            r#"{
                "not_found": "raise",
                "error_code": 7,
                "sampling": {"interval": 16},
                "execution": {"core_threads": 2}
            }"#,
        )
        .unwrap();

        assert_eq!(config.not_found, NotFoundPolicy::Raise);
        assert_eq!(config.error_code, 7);
        assert_eq!(config.sampling.interval, 16);
        assert_eq!(config.sampling.min_threshold, 10_000);
        assert_eq!(config.execution.core_threads, 2);
        assert_eq!(config.execution.max_threads, 400);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[test]
    fn builder_validates() {
        let err = DispatcherConfig::builder()
            .execution(ExecutionConfig { core_threads: 4, max_threads: 2, ..ExecutionConfig::default() })
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::CoreExceedsMax { core: 4, max: 2 });

        let err = DispatcherConfig::builder()
            .execution(ExecutionConfig { core_threads: 0, ..ExecutionConfig::default() })
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroThreads);

        let config = DispatcherConfig::builder().error_code(3).use_trailing_slash_match(true).build().unwrap();
        assert_eq!(config.error_code, 3);
        assert!(config.use_trailing_slash_match);
    }
}
