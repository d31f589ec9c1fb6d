//! Runtime types: batch jobs and per-sample outcomes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use labelforge_context::ContextInjector;
use labelforge_core::ProjectPolicy;
use labelforge_predict::LabelModelExecutor;
use labelforge_store::{SqliteStore, TaskType};

/// Batch job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    PartiallyFailed,
    Cancelled,
}

/// Terminal outcome of one sample within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleOutcome {
    /// Accepted automatically; sample is autolabeled.
    Accepted,
    /// Routed to human review.
    Review,
    /// Schema violation; sample returned to the unlabeled pool.
    Rejected,
    /// Lease held by another pipeline; skipped this batch.
    Skipped,
    /// Model unavailable after retries; left in progress for later retry.
    Failed,
}

/// A batch labeling job and its per-sample outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct BatchJob {
    pub id: String,
    pub project_id: i64,
    pub state: JobState,
    pub sample_ids: Vec<i64>,
    pub outcomes: BTreeMap<i64, SampleOutcome>,
    pub queued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a batch needs, snapshotted at schedule time. In-flight work
/// never observes later project or config edits.
#[derive(Clone)]
pub struct BatchContext {
    pub store: Arc<SqliteStore>,
    pub injector: Arc<ContextInjector>,
    pub executor: Arc<LabelModelExecutor>,
    pub policy: ProjectPolicy,
    pub task_type: TaskType,
}
