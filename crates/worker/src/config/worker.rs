//! Worker configuration.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use ymm_core::ReliabilityOptions;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier (UUID).
    pub worker_id: String,

    /// NATS server URL.
    pub nats_url: String,

    /// NATS stream name.
    pub nats_stream: String,

    /// Subject job triggers are published on.
    pub nats_subject: String,

    /// Durable consumer name.
    pub nats_consumer: String,

    /// Root directory for project files.
    pub output_root: PathBuf,

    /// Maximum jobs running at once.
    pub max_concurrent_jobs: usize,

    /// Extra attempts per step after the first failure.
    pub retry_count: u32,

    /// Delay before the first step retry.
    pub retry_delay: Duration,

    /// Skip steps whose signature artifact already exists.
    pub cache_enabled: bool,

    /// How long NATS waits for an ack before redelivering a trigger.
    pub job_ack_wait: Duration,

    /// Deliveries of one trigger before NATS gives up on it.
    pub job_max_deliver: i64,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let worker_id = std::env::var("WORKER_ID")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let cache_enabled = match std::env::var("YMM_CACHE_ENABLED") {
            Ok(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"),
            Err(_) => defaults.cache_enabled,
        };

        let retry_delay_ms: u64 = env_parse("YMM_RETRY_DELAY_MS", 0);
        let ack_wait_secs: u64 =
            env_parse("YMM_JOB_ACK_WAIT_SECS", defaults.job_ack_wait.as_secs()).max(1);

        Ok(Self {
            worker_id,
            nats_url: env_or("NATS_URL", &defaults.nats_url),
            nats_stream: env_or("NATS_STREAM", &defaults.nats_stream),
            nats_subject: env_or("NATS_SUBJECT", &defaults.nats_subject),
            nats_consumer: env_or("NATS_CONSUMER", &defaults.nats_consumer),
            output_root: std::env::var("YMM_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            max_concurrent_jobs: env_parse("WORKER_MAX_CONCURRENT", defaults.max_concurrent_jobs)
                .max(1),
            retry_count: env_parse("YMM_RETRY_COUNT", defaults.retry_count),
            retry_delay: Duration::from_millis(retry_delay_ms),
            cache_enabled,
            job_ack_wait: Duration::from_secs(ack_wait_secs),
            job_max_deliver: env_parse("YMM_JOB_MAX_DELIVER", defaults.job_max_deliver),
        })
    }

    /// Reliability settings applied to every step implementation.
    pub fn reliability(&self) -> ReliabilityOptions {
        ReliabilityOptions {
            retry_count: self.retry_count,
            cache_enabled: self.cache_enabled,
            initial_delay: self.retry_delay,
            ..Default::default()
        }
    }

    /// Interval of in-progress acks sent while a job runs, a third of the
    /// ack wait and never under one second.
    pub fn progress_interval(&self) -> Duration {
        (self.job_ack_wait / 3).max(Duration::from_secs(1))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            nats_stream: crate::nats::DEFAULT_STREAM.to_string(),
            nats_subject: crate::nats::DEFAULT_SUBJECT.to_string(),
            nats_consumer: "ymm-worker".to_string(),
            output_root: PathBuf::from("./data"),
            max_concurrent_jobs: 2,
            retry_count: 0,
            retry_delay: Duration::ZERO,
            cache_enabled: true,
            job_ack_wait: Duration::from_secs(300),
            job_max_deliver: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.nats_subject, "ymm.jobs");
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.job_ack_wait, Duration::from_secs(300));
        assert_eq!(config.job_max_deliver, 5);
    }

    #[test]
    fn test_progress_interval() {
        let config = WorkerConfig::default();
        assert_eq!(config.progress_interval(), Duration::from_secs(100));

        let config = WorkerConfig {
            job_ack_wait: Duration::from_secs(2),
            ..Default::default()
        };
        assert_eq!(config.progress_interval(), Duration::from_secs(1));
        assert!(config.progress_interval() < config.job_ack_wait);
    }

    #[test]
    fn test_reliability_options() {
        let config = WorkerConfig {
            retry_count: 3,
            cache_enabled: false,
            ..Default::default()
        };
        let options = config.reliability();
        assert_eq!(options.retry_count, 3);
        assert!(!options.cache_enabled);
        assert!(options.initial_delay.is_zero());
    }
}
