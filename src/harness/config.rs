//! Harness configuration.
//!
//! Settings load from an optional YAML file and are overridable field by
//! field through the builder methods, which is how the CLI layers its flags
//! on top. Everything is validated once, up front, before any task spawns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Bounds of the four pipeline queues.
///
/// The jobs queue is deliberately tiny so backpressure reaches the generator
/// almost immediately; the others give the feedback stages a little slack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueCapacities {
    #[serde(default = "default_jobs_capacity")]
    pub jobs: usize,
    #[serde(default = "default_side_capacity")]
    pub retries: usize,
    #[serde(default = "default_side_capacity")]
    pub results: usize,
    #[serde(default = "default_side_capacity")]
    pub analysis: usize,
}

fn default_jobs_capacity() -> usize {
    1
}

fn default_side_capacity() -> usize {
    10
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            jobs: default_jobs_capacity(),
            retries: default_side_capacity(),
            results: default_side_capacity(),
            analysis: default_side_capacity(),
        }
    }
}

/// Full configuration of one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Target URL, including scheme.
    #[serde(default)]
    pub target_url: String,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Size of the request worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Latency objective in seconds the controller converges on.
    #[serde(default = "default_slo_secs")]
    pub slo_secs: f64,

    /// Pacing delay in seconds before the first control step.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,

    /// Review passes a job may spend marked for retry before it fails.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Centroid budget of each phase digest.
    #[serde(default = "default_digest_compression")]
    pub digest_compression: f64,

    /// Samples held by the controller's trailing window.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Analyzed jobs between duration digest reseeds.
    #[serde(default = "default_truncate_interval")]
    pub truncate_interval: u32,

    /// End-to-end bound on one request exchange, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,

    /// How long shutdown waits for the pipeline to drain, in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: f64,

    /// Pipeline queue bounds.
    #[serde(default)]
    pub queues: QueueCapacities,
}

fn default_workers() -> usize {
    10
}

fn default_slo_secs() -> f64 {
    1.0
}

fn default_initial_delay_secs() -> f64 {
    0.5
}

fn default_retry_budget() -> u32 {
    3
}

fn default_digest_compression() -> f64 {
    100.0
}

fn default_window_capacity() -> usize {
    10
}

fn default_truncate_interval() -> u32 {
    10
}

fn default_request_timeout_secs() -> f64 {
    30.0
}

fn default_shutdown_timeout_secs() -> f64 {
    30.0
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            headers: BTreeMap::new(),
            workers: default_workers(),
            slo_secs: default_slo_secs(),
            initial_delay_secs: default_initial_delay_secs(),
            retry_budget: default_retry_budget(),
            digest_compression: default_digest_compression(),
            window_capacity: default_window_capacity(),
            truncate_interval: default_truncate_interval(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            queues: QueueCapacities::default(),
        }
    }
}

impl HarnessConfig {
    /// Creates a default configuration aimed at `target_url`.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_slo_secs(mut self, slo_secs: f64) -> Self {
        self.slo_secs = slo_secs;
        self
    }

    pub fn with_initial_delay_secs(mut self, initial_delay_secs: f64) -> Self {
        self.initial_delay_secs = initial_delay_secs;
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    pub fn with_digest_compression(mut self, digest_compression: f64) -> Self {
        self.digest_compression = digest_compression;
        self
    }

    pub fn with_window_capacity(mut self, window_capacity: usize) -> Self {
        self.window_capacity = window_capacity;
        self
    }

    pub fn with_truncate_interval(mut self, truncate_interval: u32) -> Self {
        self.truncate_interval = truncate_interval;
        self
    }

    pub fn with_request_timeout_secs(mut self, request_timeout_secs: f64) -> Self {
        self.request_timeout_secs = request_timeout_secs;
        self
    }

    pub fn with_shutdown_timeout_secs(mut self, shutdown_timeout_secs: f64) -> Self {
        self.shutdown_timeout_secs = shutdown_timeout_secs;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    /// Shutdown drain timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_timeout_secs)
    }

    /// Checks every field once, before anything spawns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    message: format!("must be a positive number, got {value}"),
                });
            }
            Ok(())
        }

        if self.target_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "target_url",
                message: "must not be empty".to_string(),
            });
        }
        if !self.target_url.starts_with("http://") && !self.target_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "target_url",
                message: "scheme must be http or https".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers",
                message: "need at least one worker".to_string(),
            });
        }
        positive("slo_secs", self.slo_secs)?;
        positive("initial_delay_secs", self.initial_delay_secs)?;
        positive("digest_compression", self.digest_compression)?;
        positive("request_timeout_secs", self.request_timeout_secs)?;
        positive("shutdown_timeout_secs", self.shutdown_timeout_secs)?;
        if self.window_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "window_capacity",
                message: "need at least one sample".to_string(),
            });
        }
        if self.truncate_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "truncate_interval",
                message: "must be at least one".to_string(),
            });
        }
        for (key, capacity) in [
            ("queues.jobs", self.queues.jobs),
            ("queues.retries", self.queues.retries),
            ("queues.results", self.queues.results),
            ("queues.analysis", self.queues.analysis),
        ] {
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    message: "queue capacity must be at least one".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate_once_url_is_set() {
        let config = HarnessConfig::new("http://localhost:10080");
        config.validate().unwrap();

        assert_eq!(config.workers, 10);
        assert!((config.slo_secs - 1.0).abs() < f64::EPSILON);
        assert!((config.initial_delay_secs - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.retry_budget, 3);
        assert_eq!(config.queues.jobs, 1);
        assert_eq!(config.queues.retries, 10);
        assert_eq!(config.queues.results, 10);
        assert_eq!(config.queues.analysis, 10);
    }

    #[test]
    fn test_empty_url_rejected() {
        let error = HarnessConfig::default().validate().unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                key: "target_url",
                ..
            }
        ));
    }

    #[test]
    fn test_scheme_checked() {
        let config = HarnessConfig::new("ftp://example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = HarnessConfig::new("http://localhost:10080").with_workers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nonpositive_slo_rejected() {
        let config = HarnessConfig::new("http://localhost:10080").with_slo_secs(0.0);
        assert!(config.validate().is_err());
        let config = HarnessConfig::new("http://localhost:10080").with_slo_secs(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut config = HarnessConfig::new("http://localhost:10080");
        config.queues.jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip_with_partial_fields() {
        let yaml = "
target_url: http://localhost:10080/health
slo_secs: 0.25
workers: 4
headers:
  Accept: application/json
queues:
  retries: 32
";
        let config: HarnessConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.target_url, "http://localhost:10080/health");
        assert!((config.slo_secs - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.workers, 4);
        assert_eq!(config.headers["Accept"], "application/json");
        // Unset fields fall back to their defaults.
        assert_eq!(config.queues.jobs, 1);
        assert_eq!(config.queues.retries, 32);
        assert_eq!(config.retry_budget, 3);
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paceline.yaml");
        std::fs::write(&path, "target_url: http://localhost:10080\nslo_secs: 0.5\n").unwrap();

        let config = HarnessConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.target_url, "http://localhost:10080");
        assert!((config.slo_secs - 0.5).abs() < f64::EPSILON);

        let missing = HarnessConfig::from_yaml_file(dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_unknown_yaml_field_rejected() {
        let yaml = "
target_url: http://localhost:10080
concurrency: 4
";
        assert!(serde_yaml::from_str::<HarnessConfig>(yaml).is_err());
    }
}
