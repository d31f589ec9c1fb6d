//! Engine facade — wires the selector, injector, executor, QA, and
//! scheduler behind the operations the command surface calls.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::export;
use crate::scheduler::JobScheduler;
use crate::types::{BatchContext, BatchJob};
use labelforge_context::ContextInjector;
use labelforge_core::{EngineConfig, Error, Result};
use labelforge_predict::LabelModelExecutor;
use labelforge_qa::QaEngine;
use labelforge_select::{ActiveLearningSelector, SelectorConfig};
use labelforge_store::{
    AnnotationSource, AuditEntry, DecisionKind, NewAnnotation, NewAuditEntry, NewProject,
    Project, QualityMetric, ReviewTask, SampleStatus, SqliteStore, StoreStats, TaskType,
};

/// Engine status for the health surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub active_jobs: usize,
    pub pool_in_use: usize,
    pub pool_capacity: usize,
    pub store: StoreStats,
}

/// Top-level orchestration engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<SqliteStore>,
    injector: Arc<ContextInjector>,
    executor: Arc<LabelModelExecutor>,
    selector: ActiveLearningSelector,
    scheduler: JobScheduler,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<SqliteStore>,
        injector: Arc<ContextInjector>,
        executor: Arc<LabelModelExecutor>,
    ) -> Self {
        let selector = ActiveLearningSelector::new(SelectorConfig {
            active_learning: config.enable_active_learning,
            ..Default::default()
        });
        let scheduler = JobScheduler::new(config.max_concurrent_jobs);
        info!(
            "Engine initialized: {} worker slots, active learning {}",
            config.max_concurrent_jobs,
            if config.enable_active_learning { "on" } else { "off" }
        );
        Self {
            config,
            store,
            injector,
            executor,
            selector,
            scheduler,
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Create a project, filling unset thresholds from engine defaults.
    pub fn create_project(
        &self,
        name: &str,
        task_type: TaskType,
        label_schema: Vec<String>,
        confidence_threshold: Option<f64>,
        require_double_annotation: Option<bool>,
        agreement_threshold: Option<f64>,
    ) -> Result<Project> {
        if label_schema.is_empty() {
            return Err(Error::Config("label schema must not be empty".into()));
        }
        let id = self.store.create_project(NewProject {
            name: name.to_string(),
            task_type,
            label_schema,
            confidence_threshold: confidence_threshold
                .unwrap_or(self.config.default_confidence_threshold),
            require_double_annotation: require_double_annotation
                .unwrap_or(self.config.require_double_annotation),
            agreement_threshold: agreement_threshold.unwrap_or(self.config.agreement_threshold),
        })?;
        self.store
            .get_project(id)?
            .ok_or_else(|| Error::NotFound(format!("project {}", id)))
    }

    /// Import samples from a JSONL payload.
    pub fn import_samples(&self, project_id: i64, payload: &str) -> Result<Vec<i64>> {
        export::import_jsonl(&self.store, project_id, payload, "importer")
    }

    /// Select a batch and schedule it. The policy snapshot is taken here;
    /// later project edits do not affect this batch. Per-call overrides
    /// mirror the `label` command's knobs.
    pub fn schedule_batch(
        &self,
        project_id: i64,
        batch_size: usize,
        confidence_threshold: Option<f64>,
        require_double_annotation: Option<bool>,
    ) -> Result<String> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;
        let mut policy = self.store.project_policy(project_id)?;
        if let Some(threshold) = confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::Config(format!(
                    "confidence threshold must be in [0,1], got {}",
                    threshold
                )));
            }
            policy.confidence_threshold = threshold;
        }
        if let Some(double) = require_double_annotation {
            policy.require_double_annotation = double;
        }

        let sample_ids = self
            .selector
            .select_batch(&self.store, project_id, batch_size)?;

        let ctx = BatchContext {
            store: self.store.clone(),
            injector: self.injector.clone(),
            executor: self.executor.clone(),
            policy,
            task_type: project.task_type,
        };
        let job_id = self.scheduler.spawn_batch(ctx, sample_ids);
        info!("Scheduled job {} for project {}", job_id, project_id);
        Ok(job_id)
    }

    pub fn job(&self, job_id: &str) -> Option<BatchJob> {
        self.scheduler.job(job_id)
    }

    pub fn jobs(&self) -> Vec<BatchJob> {
        self.scheduler.jobs()
    }

    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.scheduler.cancel(job_id)
    }

    /// Lossless JSONL export of a project.
    pub fn export(&self, project_id: i64) -> Result<String> {
        export::export_project(&self.store, project_id)
    }

    /// Full provenance of a sample.
    pub fn history(&self, sample_id: i64) -> Result<Vec<AuditEntry>> {
        let history = self.store.audit_history(sample_id)?;
        if history.is_empty() {
            return Err(Error::NotFound(format!("sample {}", sample_id)));
        }
        Ok(history)
    }

    pub fn open_reviews(&self) -> Result<Vec<ReviewTask>> {
        self.store.open_review_tasks()
    }

    /// Resolve a review task with a human verdict. A label approves the
    /// sample with that annotation; no label rejects it outright.
    pub fn resolve_review(
        &self,
        task_id: i64,
        reviewer: &str,
        label: Option<String>,
    ) -> Result<ReviewTask> {
        let task = self
            .store
            .get_review_task(task_id)?
            .ok_or_else(|| Error::NotFound(format!("review task {}", task_id)))?;
        let sample = self
            .store
            .get_sample(task.sample_id)?
            .ok_or_else(|| Error::NotFound(format!("sample {}", task.sample_id)))?;
        let policy = self.store.project_policy(sample.project_id)?;
        let project = self
            .store
            .get_project(sample.project_id)?
            .ok_or_else(|| Error::NotFound(format!("project {}", sample.project_id)))?;

        let (status, outcome, detail) = match &label {
            Some(label) => {
                if !policy.allows_label(label) {
                    return Err(Error::SchemaViolation(label.clone()));
                }
                let annotation_id = self.store.add_annotation(&NewAnnotation {
                    sample_id: sample.id,
                    label: label.clone(),
                    source: AnnotationSource::Human,
                    confidence: None,
                    producer: reviewer.to_string(),
                })?;
                self.store.set_authoritative(sample.id, annotation_id)?;
                (
                    SampleStatus::Reviewed,
                    "approved",
                    format!("label '{}'", label),
                )
            }
            None => (
                SampleStatus::Rejected,
                "rejected",
                "rejected by reviewer".to_string(),
            ),
        };

        self.store.resolve_review(
            task_id,
            reviewer,
            outcome,
            status,
            &NewAuditEntry {
                sample_id: sample.id,
                decision: DecisionKind::HumanReview,
                actor: reviewer.to_string(),
                confidence: None,
                context_hash: None,
                policy_version: policy.policy_version,
                resulting_status: status,
                detail: Some(detail),
            },
        )?;

        // Record any residual disagreement in the QA report; the human
        // label being authoritative keeps this from reopening review.
        QaEngine::enforce(&self.store, &policy, project.task_type, sample.id, "qa-engine")?;

        self.store
            .get_review_task(task_id)?
            .ok_or_else(|| Error::NotFound(format!("review task {}", task_id)))
    }

    /// Recompute and append the project quality metric snapshot.
    pub fn recompute_quality(&self, project_id: i64, window: usize) -> Result<QualityMetric> {
        QaEngine::recompute_metrics(&self.store, project_id, window)
    }

    /// Engine status for the health surface.
    pub fn status(&self) -> Result<EngineStatus> {
        let (pool_in_use, pool_capacity) = self.scheduler.pool_usage();
        Ok(EngineStatus {
            active_jobs: self.scheduler.active_jobs(),
            pool_in_use,
            pool_capacity,
            store: self.store.stats()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobState, SampleOutcome};
    use labelforge_context::StaticContextProvider;
    use labelforge_predict::{ExecutorConfig, FixedLabelModelProvider};
    use std::time::Duration;

    fn test_engine(label: &str, confidence: f64) -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        let config = EngineConfig {
            max_concurrent_jobs: 2,
            ..Default::default()
        };
        let engine = Engine::new(
            config,
            store,
            Arc::new(ContextInjector::new(
                Arc::new(StaticContextProvider::new(serde_json::json!({
                    "PERSON": ["Ada Lovelace"]
                }))),
                1_000,
            )),
            Arc::new(LabelModelExecutor::new(
                Arc::new(FixedLabelModelProvider::new(label, confidence)),
                ExecutorConfig {
                    timeout_ms: 100,
                    max_retries: 0,
                    backoff_ms: 1,
                },
            )),
        );
        (engine, dir)
    }

    fn ner_project(engine: &Engine) -> Project {
        engine
            .create_project(
                "entities",
                TaskType::Ner,
                vec![
                    "PERSON".into(),
                    "ORG".into(),
                    "PRODUCT".into(),
                    "LOCATION".into(),
                ],
                Some(0.9),
                Some(false),
                Some(0.8),
            )
            .unwrap()
    }

    async fn finished_job(engine: &Engine, job_id: &str) -> BatchJob {
        for _ in 0..200 {
            let job = engine.job(job_id).unwrap();
            if !matches!(job.state, JobState::Queued | JobState::Running) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_high_confidence_batch_auto_labels() {
        let (engine, _dir) = test_engine("PERSON", 0.95);
        let project = ner_project(&engine);
        let ids = engine
            .import_samples(
                project.id,
                "{\"content_ref\": \"Ada Lovelace wrote programs\"}\n",
            )
            .unwrap();

        let job_id = engine
            .schedule_batch(project.id, 10, None, None)
            .unwrap();
        let job = finished_job(&engine, &job_id).await;

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.outcomes[&ids[0]], SampleOutcome::Accepted);

        let history = engine.history(ids[0]).unwrap();
        let accepts: Vec<_> = history
            .iter()
            .filter(|e| e.decision == DecisionKind::Accept)
            .collect();
        assert_eq!(accepts.len(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_batch_routes_to_review() {
        let (engine, _dir) = test_engine("PERSON", 0.6);
        let project = ner_project(&engine);
        let ids = engine
            .import_samples(project.id, "{\"content_ref\": \"mystery text\"}\n")
            .unwrap();

        let job_id = engine.schedule_batch(project.id, 10, None, None).unwrap();
        let job = finished_job(&engine, &job_id).await;

        assert_eq!(job.outcomes[&ids[0]], SampleOutcome::Review);
        assert_eq!(engine.open_reviews().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_override_applies_to_batch_only() {
        let (engine, _dir) = test_engine("PERSON", 0.6);
        let project = ner_project(&engine);
        let ids = engine
            .import_samples(project.id, "{\"content_ref\": \"borderline\"}\n")
            .unwrap();

        // Override drops the bar below the prediction's confidence.
        let job_id = engine
            .schedule_batch(project.id, 10, Some(0.5), None)
            .unwrap();
        let job = finished_job(&engine, &job_id).await;
        assert_eq!(job.outcomes[&ids[0]], SampleOutcome::Accepted);

        // The stored project policy is untouched.
        let stored = engine.store().get_project(project.id).unwrap().unwrap();
        assert_eq!(stored.confidence_threshold, 0.9);
    }

    #[tokio::test]
    async fn test_empty_pool_surfaces() {
        let (engine, _dir) = test_engine("PERSON", 0.95);
        let project = ner_project(&engine);
        let err = engine
            .schedule_batch(project.id, 10, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyPool(_)));
    }

    #[tokio::test]
    async fn test_review_resolution_approves_sample() {
        let (engine, _dir) = test_engine("PERSON", 0.6);
        let project = ner_project(&engine);
        let ids = engine
            .import_samples(project.id, "{\"content_ref\": \"needs a reviewer\"}\n")
            .unwrap();
        let job_id = engine.schedule_batch(project.id, 10, None, None).unwrap();
        finished_job(&engine, &job_id).await;

        let reviews = engine.open_reviews().unwrap();
        assert_eq!(reviews.len(), 1);
        let task = engine
            .resolve_review(reviews[0].id, "alice", Some("ORG".into()))
            .unwrap();
        assert_eq!(task.outcome.as_deref(), Some("approved"));

        let sample = engine.store().get_sample(ids[0]).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::Reviewed);
        let authoritative = engine
            .store()
            .authoritative_annotation(ids[0])
            .unwrap()
            .unwrap();
        assert_eq!(authoritative.label, "ORG");
        assert_eq!(authoritative.source, AnnotationSource::Human);
        assert_eq!(authoritative.confidence, None);

        // Model proposal and human verdict disagreed, but adjudication is
        // final: no new review task.
        assert!(engine.open_reviews().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_resolution_rejects_sample() {
        let (engine, _dir) = test_engine("PERSON", 0.6);
        let project = ner_project(&engine);
        let ids = engine
            .import_samples(project.id, "{\"content_ref\": \"junk sample\"}\n")
            .unwrap();
        let job_id = engine.schedule_batch(project.id, 10, None, None).unwrap();
        finished_job(&engine, &job_id).await;

        let reviews = engine.open_reviews().unwrap();
        engine.resolve_review(reviews[0].id, "alice", None).unwrap();

        let sample = engine.store().get_sample(ids[0]).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::Rejected);
    }

    #[tokio::test]
    async fn test_reviewer_label_must_fit_schema() {
        let (engine, _dir) = test_engine("PERSON", 0.6);
        let project = ner_project(&engine);
        engine
            .import_samples(project.id, "{\"content_ref\": \"text\"}\n")
            .unwrap();
        let job_id = engine.schedule_batch(project.id, 10, None, None).unwrap();
        finished_job(&engine, &job_id).await;

        let reviews = engine.open_reviews().unwrap();
        let err = engine
            .resolve_review(reviews[0].id, "alice", Some("ALIEN".into()))
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
        // Task stays open
        assert_eq!(engine.open_reviews().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_export_idempotent_after_labeling() {
        let (engine, _dir) = test_engine("PERSON", 0.95);
        let project = ner_project(&engine);
        engine
            .import_samples(
                project.id,
                "{\"content_ref\": \"alpha\"}\n{\"content_ref\": \"beta\"}\n",
            )
            .unwrap();
        let job_id = engine.schedule_batch(project.id, 10, None, None).unwrap();
        finished_job(&engine, &job_id).await;

        let first = engine.export(project.id).unwrap();
        let second = engine.export(project.id).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_status_reports_store_and_pool() {
        let (engine, _dir) = test_engine("PERSON", 0.95);
        let project = ner_project(&engine);
        engine
            .import_samples(project.id, "{\"content_ref\": \"one\"}\n")
            .unwrap();

        let status = engine.status().unwrap();
        assert_eq!(status.pool_capacity, 2);
        assert_eq!(status.store.total_samples, 1);
    }
}
