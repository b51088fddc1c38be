//! Worker configuration

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll interval between cycles
    pub poll_interval: Duration,

    /// Timeout for one reconstruction tool run
    pub task_timeout: Duration,

    /// Root of the per-task work directories
    pub work_dir: PathBuf,

    /// File extension of the model artifact the tool produces
    pub artifact_extension: String,

    /// When set, failed tasks get `retryCount`/`failureReason` recorded in
    /// the shared list and flip to `failed` once this many attempts are
    /// spent. When unset, failures are only logged and the task is retried
    /// every cycle.
    pub max_attempts: Option<u32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(300), // 5 minutes
            work_dir: PathBuf::from("./local_cache/processing"),
            artifact_extension: "ply".to_string(),
            max_attempts: None,
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set poll interval
    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = duration;
        self
    }

    /// Set poll interval in seconds
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval = Duration::from_secs(secs);
        self
    }

    /// Set reconstruction timeout
    pub fn task_timeout(mut self, duration: Duration) -> Self {
        self.config.task_timeout = duration;
        self
    }

    /// Set the work directory root
    pub fn work_dir(mut self, dir: PathBuf) -> Self {
        self.config.work_dir = dir;
        self
    }

    /// Enable failure tracking after the given number of attempts
    pub fn max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
