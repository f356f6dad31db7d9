use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::DriftwatchError;

/// URL-differ knobs.
#[derive(Debug, Clone)]
pub struct DifferConfig {
    /// Re-apply canonicalization when building diff keys.
    pub normalize_urls: bool,
    /// Compare diff keys case-sensitively.
    pub case_sensitive: bool,
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            normalize_urls: true,
            case_sensitive: true,
        }
    }
}

/// Scan-workflow knobs.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub crawler_timeout: Duration,
    pub probe_timeout: Duration,
    pub probe_threads: usize,
    /// Subdivide seeds into batches above this count. 0 disables batching.
    pub batch_size_threshold: usize,
    pub corpus_base_path: PathBuf,
    pub report_output_dir: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            crawler_timeout: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(30),
            probe_threads: 10,
            batch_size_threshold: 0,
            corpus_base_path: PathBuf::from("data/corpus"),
            report_output_dir: PathBuf::from("data/reports"),
        }
    }
}

/// Scheduler knobs. `validate` is fatal at construction.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cycle: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub history_db_path: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(60 * 60),
            retry_attempts: 2,
            retry_delay: Duration::from_secs(300),
            history_db_path: PathBuf::from("data/driftwatch.db"),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), DriftwatchError> {
        if self.cycle.is_zero() {
            return Err(DriftwatchError::Validation(
                "cycle duration must be positive".into(),
            ));
        }
        if self.history_db_path.as_os_str().is_empty() {
            return Err(DriftwatchError::Validation(
                "history database path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target source: a file path, or a comma-separated inline URL list.
    pub target_source: String,
    pub cycle_minutes: u64,
    pub retry_attempts: u32,
    pub history_db_path: PathBuf,
    pub corpus_base_path: PathBuf,
    pub report_output_dir: PathBuf,
    pub webhook_url: Option<String>,
    pub crawler_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub probe_threads: usize,
    pub batch_size_threshold: usize,
    pub normalize_urls: bool,
    pub case_sensitive: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            target_source: required_env("DRIFTWATCH_TARGETS"),
            cycle_minutes: parsed_env("DRIFTWATCH_CYCLE_MINUTES", 60),
            retry_attempts: parsed_env("DRIFTWATCH_RETRY_ATTEMPTS", 2),
            history_db_path: env::var("DRIFTWATCH_DB_PATH")
                .unwrap_or_else(|_| "data/driftwatch.db".to_string())
                .into(),
            corpus_base_path: env::var("DRIFTWATCH_CORPUS_DIR")
                .unwrap_or_else(|_| "data/corpus".to_string())
                .into(),
            report_output_dir: env::var("DRIFTWATCH_REPORT_DIR")
                .unwrap_or_else(|_| "data/reports".to_string())
                .into(),
            webhook_url: env::var("DRIFTWATCH_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            crawler_timeout_secs: parsed_env("DRIFTWATCH_CRAWLER_TIMEOUT_SECS", 300),
            probe_timeout_secs: parsed_env("DRIFTWATCH_PROBE_TIMEOUT_SECS", 30),
            probe_threads: parsed_env("DRIFTWATCH_PROBE_THREADS", 10),
            batch_size_threshold: parsed_env("DRIFTWATCH_BATCH_SIZE_THRESHOLD", 0),
            normalize_urls: parsed_env("DRIFTWATCH_NORMALIZE_URLS", true),
            case_sensitive: parsed_env("DRIFTWATCH_CASE_SENSITIVE", true),
        }
    }

    pub fn differ(&self) -> DifferConfig {
        DifferConfig {
            normalize_urls: self.normalize_urls,
            case_sensitive: self.case_sensitive,
        }
    }

    pub fn workflow(&self) -> WorkflowConfig {
        WorkflowConfig {
            crawler_timeout: Duration::from_secs(self.crawler_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            probe_threads: self.probe_threads.max(1),
            batch_size_threshold: self.batch_size_threshold,
            corpus_base_path: self.corpus_base_path.clone(),
            report_output_dir: self.report_output_dir.clone(),
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            cycle: Duration::from_secs(self.cycle_minutes * 60),
            retry_attempts: self.retry_attempts,
            retry_delay: Duration::from_secs(300),
            history_db_path: self.history_db_path.clone(),
        }
    }

    /// Log the effective configuration at startup. Secrets stay out of
    /// the log; the webhook URL is reported by length only.
    pub fn log_startup(&self) {
        tracing::info!(
            targets = %self.target_source,
            cycle_minutes = self.cycle_minutes,
            retry_attempts = self.retry_attempts,
            db = %self.history_db_path.display(),
            corpus = %self.corpus_base_path.display(),
            reports = %self.report_output_dir.display(),
            "Driftwatch configuration"
        );
        match &self.webhook_url {
            Some(url) => tracing::info!("DRIFTWATCH_WEBHOOK_URL = ({} chars)", url.len()),
            None => tracing::info!("DRIFTWATCH_WEBHOOK_URL = (empty)"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_rejects_zero_cycle() {
        let config = SchedulerConfig {
            cycle: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn scheduler_config_rejects_empty_db_path() {
        let config = SchedulerConfig {
            history_db_path: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_validate() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }
}
