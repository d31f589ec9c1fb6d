//! Engine configuration and per-batch policy snapshots.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level engine configuration.
///
/// Read once at startup; per-batch values are snapshotted into a
/// [`ProjectPolicy`] when the batch is scheduled, so live edits never
/// affect in-flight work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory holding the SQLite database.
    pub data_dir: std::path::PathBuf,
    /// Confidence threshold applied when a project does not set its own.
    pub default_confidence_threshold: f64,
    /// Use uncertainty/diversity selection; falls back to oldest-first when off.
    pub enable_active_learning: bool,
    /// Worker-pool cap shared across all active batch jobs.
    pub max_concurrent_jobs: usize,
    /// Default double-annotation policy for new projects.
    pub require_double_annotation: bool,
    /// Default inter-annotator agreement threshold for new projects.
    pub agreement_threshold: f64,
    /// Timeout for a single external provider call, in milliseconds.
    pub provider_timeout_ms: u64,
    /// Retry attempts per label-model provider before falling back.
    pub predict_max_retries: u32,
    /// Initial backoff between retries, in milliseconds (doubles per attempt).
    pub predict_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: 3060,
            data_dir: std::path::PathBuf::from("data"),
            default_confidence_threshold: 0.9,
            enable_active_learning: true,
            max_concurrent_jobs: 4,
            require_double_annotation: false,
            agreement_threshold: 0.8,
            provider_timeout_ms: 10_000,
            predict_max_retries: 2,
            predict_backoff_ms: 200,
        }
    }
}

impl EngineConfig {
    /// Build configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("LABELFORGE_PORT") {
            config.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid LABELFORGE_PORT: {}", port)))?;
        }
        if let Ok(dir) = std::env::var("LABELFORGE_DATA_DIR") {
            config.data_dir = std::path::PathBuf::from(dir);
        }
        if let Ok(v) = std::env::var("LABELFORGE_CONFIDENCE_THRESHOLD") {
            config.default_confidence_threshold = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid confidence threshold: {}", v)))?;
        }
        if let Ok(v) = std::env::var("LABELFORGE_ACTIVE_LEARNING") {
            config.enable_active_learning = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Ok(v) = std::env::var("LABELFORGE_MAX_CONCURRENT_JOBS") {
            config.max_concurrent_jobs = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid max_concurrent_jobs: {}", v)))?;
        }
        if let Ok(v) = std::env::var("LABELFORGE_DOUBLE_ANNOTATION") {
            config.require_double_annotation = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Ok(v) = std::env::var("LABELFORGE_AGREEMENT_THRESHOLD") {
            config.agreement_threshold = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid agreement threshold: {}", v)))?;
        }
        if let Ok(v) = std::env::var("LABELFORGE_PROVIDER_TIMEOUT_MS") {
            config.provider_timeout_ms = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid provider timeout: {}", v)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before any batch runs with them.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_confidence_threshold) {
            return Err(Error::Config(format!(
                "default_confidence_threshold must be in [0,1], got {}",
                self.default_confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.agreement_threshold) {
            return Err(Error::Config(format!(
                "agreement_threshold must be in [0,1], got {}",
                self.agreement_threshold
            )));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "max_concurrent_jobs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Immutable routing/QA policy captured at batch start.
///
/// Mutating a project's policy only affects batches scheduled afterwards;
/// every in-flight pipeline reads this snapshot, never the live row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPolicy {
    pub project_id: i64,
    pub confidence_threshold: f64,
    pub require_double_annotation: bool,
    pub agreement_threshold: f64,
    /// Allowed label values. Immutable once the project has samples.
    pub label_schema: Vec<String>,
    /// Incremented on every policy update; recorded in audit entries.
    pub policy_version: i64,
}

impl ProjectPolicy {
    pub fn allows_label(&self, label: &str) -> bool {
        self.label_schema.iter().any(|l| l == label)
    }
}
