//! Per-sample processing pipeline.
//!
//! One unit of work: lease → context injection → prediction → routing →
//! audited transition → quality assurance. The lease guarantees a single
//! writer per sample; audit entries commit with their status mutations
//! inside the store.

use tracing::{debug, warn};

use crate::router::{ConfidenceRouter, Decision};
use crate::types::{BatchContext, SampleOutcome};
use labelforge_core::{Error, Result};
use labelforge_qa::QaEngine;
use labelforge_store::{
    AnnotationSource, DecisionKind, NewAnnotation, NewAuditEntry, SampleStatus,
};

/// Process one sample under its lease. Returns the per-sample outcome;
/// only fatal (storage) errors propagate as `Err`.
pub async fn process_sample(
    ctx: &BatchContext,
    sample_id: i64,
    worker: &str,
) -> Result<SampleOutcome> {
    match ctx.store.acquire_lease(sample_id, worker) {
        Ok(()) => {}
        Err(Error::ConcurrencyConflict(_)) => {
            debug!("Sample {} already leased; skipping", sample_id);
            return Ok(SampleOutcome::Skipped);
        }
        Err(e) => return Err(e),
    }

    let result = process_leased(ctx, sample_id, worker).await;

    if let Err(e) = ctx.store.release_lease(sample_id, worker) {
        warn!("Failed to release lease on sample {}: {}", sample_id, e);
    }
    result
}

async fn process_leased(
    ctx: &BatchContext,
    sample_id: i64,
    worker: &str,
) -> Result<SampleOutcome> {
    let sample = ctx
        .store
        .get_sample(sample_id)?
        .ok_or_else(|| Error::NotFound(format!("sample {}", sample_id)))?;

    // Only pool samples and stalled retries are processable; anything else
    // was already decided (possibly by a pipeline that ran between this
    // batch's selection and its lease).
    if !matches!(
        sample.status,
        SampleStatus::Unlabeled | SampleStatus::InProgress
    ) {
        debug!("Sample {} already {}; skipping", sample_id, sample.status);
        return Ok(SampleOutcome::Skipped);
    }

    ctx.store.transition_sample(
        sample_id,
        SampleStatus::InProgress,
        &NewAuditEntry {
            sample_id,
            decision: DecisionKind::Started,
            actor: worker.to_string(),
            confidence: None,
            context_hash: None,
            policy_version: ctx.policy.policy_version,
            resulting_status: SampleStatus::InProgress,
            detail: None,
        },
    )?;

    let context = ctx.injector.enrich(&ctx.store, &sample).await?;
    let context_hash = context.content_hash().map(|h| h.to_string());

    let prediction = match ctx
        .executor
        .predict(&sample.content_ref, context.entities())
        .await
    {
        Ok(p) => p,
        Err(Error::ModelUnavailable(reason)) => {
            // Stays in progress; re-invoking selection will retry it.
            warn!("Sample {} failed prediction: {}", sample_id, reason);
            return Ok(SampleOutcome::Failed);
        }
        Err(e) => return Err(e),
    };

    let decision = ConfidenceRouter::route(&ctx.policy, &prediction);
    debug!(
        "Sample {}: label '{}' confidence {:.2} -> {:?}",
        sample_id, prediction.label, prediction.confidence, decision
    );

    let outcome = match decision {
        Decision::Accept => {
            let annotation_id = ctx.store.add_annotation(&NewAnnotation {
                sample_id,
                label: prediction.label.clone(),
                source: AnnotationSource::Model,
                confidence: Some(prediction.confidence),
                producer: prediction.producer.clone(),
            })?;
            ctx.store.set_authoritative(sample_id, annotation_id)?;
            ctx.store.transition_sample(
                sample_id,
                SampleStatus::AutoLabeled,
                &NewAuditEntry {
                    sample_id,
                    decision: DecisionKind::Accept,
                    actor: prediction.producer.clone(),
                    confidence: Some(prediction.confidence),
                    context_hash: context_hash.clone(),
                    policy_version: ctx.policy.policy_version,
                    resulting_status: SampleStatus::AutoLabeled,
                    detail: Some(format!("label '{}'", prediction.label)),
                },
            )?;
            SampleOutcome::Accepted
        }
        Decision::Review => {
            // Not authoritative until a reviewer (or QA) confirms it.
            ctx.store.add_annotation(&NewAnnotation {
                sample_id,
                label: prediction.label.clone(),
                source: AnnotationSource::Model,
                confidence: Some(prediction.confidence),
                producer: prediction.producer.clone(),
            })?;
            ctx.store.route_to_review(
                sample_id,
                &NewAuditEntry {
                    sample_id,
                    decision: DecisionKind::Review,
                    actor: prediction.producer.clone(),
                    confidence: Some(prediction.confidence),
                    context_hash: context_hash.clone(),
                    policy_version: ctx.policy.policy_version,
                    resulting_status: SampleStatus::PendingReview,
                    detail: Some(format!("label '{}'", prediction.label)),
                },
            )?;
            SampleOutcome::Review
        }
        Decision::Reject => {
            ctx.store.transition_sample(
                sample_id,
                SampleStatus::Unlabeled,
                &NewAuditEntry {
                    sample_id,
                    decision: DecisionKind::SchemaViolation,
                    actor: prediction.producer.clone(),
                    confidence: Some(prediction.confidence),
                    context_hash: context_hash.clone(),
                    policy_version: ctx.policy.policy_version,
                    resulting_status: SampleStatus::Unlabeled,
                    detail: Some(format!(
                        "predicted label '{}' not in schema",
                        prediction.label
                    )),
                },
            )?;
            return Ok(SampleOutcome::Rejected);
        }
    };

    // QA may override the decision just made.
    let report = QaEngine::enforce(
        &ctx.store,
        &ctx.policy,
        ctx.task_type,
        sample_id,
        "qa-engine",
    )?;
    if report.review_forced {
        return Ok(SampleOutcome::Review);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use labelforge_context::{ContextInjector, StaticContextProvider};
    use labelforge_core::ProjectPolicy;
    use labelforge_predict::{ExecutorConfig, FixedLabelModelProvider, LabelModelExecutor};
    use labelforge_store::{NewProject, SqliteStore, TaskType};

    fn test_context(label: &str, confidence: f64) -> (BatchContext, tempfile::TempDir, i64) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        let project_id = store
            .create_project(NewProject {
                name: "p".into(),
                task_type: TaskType::Ner,
                label_schema: vec![
                    "PERSON".into(),
                    "ORG".into(),
                    "PRODUCT".into(),
                    "LOCATION".into(),
                ],
                confidence_threshold: 0.9,
                require_double_annotation: false,
                agreement_threshold: 0.8,
            })
            .unwrap();
        let policy = store.project_policy(project_id).unwrap();
        let ctx = BatchContext {
            store,
            injector: Arc::new(ContextInjector::new(
                Arc::new(StaticContextProvider::new(
                    serde_json::json!({"PERSON": ["Ada"]}),
                )),
                1_000,
            )),
            executor: Arc::new(LabelModelExecutor::new(
                Arc::new(FixedLabelModelProvider::new(label, confidence)),
                ExecutorConfig {
                    timeout_ms: 100,
                    max_retries: 0,
                    backoff_ms: 1,
                },
            )),
            policy,
            task_type: TaskType::Ner,
        };
        (ctx, dir, project_id)
    }

    fn add_sample(ctx: &BatchContext, project_id: i64) -> i64 {
        ctx.store
            .add_sample(project_id, "Ada Lovelace", None, "test")
            .unwrap()
    }

    #[tokio::test]
    async fn test_high_confidence_sample_is_accepted() {
        let (ctx, _dir, project_id) = test_context("PERSON", 0.95);
        let sample_id = add_sample(&ctx, project_id);

        let outcome = process_sample(&ctx, sample_id, "job-1").await.unwrap();
        assert_eq!(outcome, SampleOutcome::Accepted);

        let sample = ctx.store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::AutoLabeled);

        let authoritative = ctx
            .store
            .authoritative_annotation(sample_id)
            .unwrap()
            .unwrap();
        assert_eq!(authoritative.label, "PERSON");
        assert_eq!(authoritative.confidence, Some(0.95));

        // imported, started, accept; the accept entry carries the context hash
        let history = ctx.store.audit_history(sample_id).unwrap();
        assert_eq!(history.len(), 3);
        let accept = history.last().unwrap();
        assert_eq!(accept.decision, DecisionKind::Accept);
        assert!(accept.context_hash.is_some());
        assert_eq!(accept.resulting_status, sample.status);
    }

    #[tokio::test]
    async fn test_low_confidence_sample_goes_to_review() {
        let (ctx, _dir, project_id) = test_context("PERSON", 0.6);
        let sample_id = add_sample(&ctx, project_id);

        let outcome = process_sample(&ctx, sample_id, "job-1").await.unwrap();
        assert_eq!(outcome, SampleOutcome::Review);

        let sample = ctx.store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::PendingReview);
        assert!(ctx.store.open_review_task(sample_id).unwrap().is_some());

        // The model's proposal is recorded but not authoritative.
        assert!(ctx
            .store
            .authoritative_annotation(sample_id)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_schema_violation_returns_sample_to_pool() {
        let (ctx, _dir, project_id) = test_context("ALIEN", 0.99);
        let sample_id = add_sample(&ctx, project_id);

        let outcome = process_sample(&ctx, sample_id, "job-1").await.unwrap();
        assert_eq!(outcome, SampleOutcome::Rejected);

        let sample = ctx.store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::Unlabeled);

        let history = ctx.store.audit_history(sample_id).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.decision, DecisionKind::SchemaViolation);
        assert!(last.detail.as_deref().unwrap().contains("ALIEN"));
        assert!(ctx.store.open_review_task(sample_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_double_annotation_policy_requires_review() {
        let (mut ctx, _dir, project_id) = test_context("PERSON", 0.97);
        ctx.policy.require_double_annotation = true;
        let sample_id = add_sample(&ctx, project_id);

        let outcome = process_sample(&ctx, sample_id, "job-1").await.unwrap();
        assert_eq!(outcome, SampleOutcome::Review);
        let sample = ctx.store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_leased_sample_is_skipped() {
        let (ctx, _dir, project_id) = test_context("PERSON", 0.95);
        let sample_id = add_sample(&ctx, project_id);
        ctx.store.acquire_lease(sample_id, "other-job").unwrap();

        let outcome = process_sample(&ctx, sample_id, "job-1").await.unwrap();
        assert_eq!(outcome, SampleOutcome::Skipped);

        // Untouched by the skipping pipeline
        let sample = ctx.store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::Unlabeled);
    }

    #[tokio::test]
    async fn test_simultaneous_pipelines_one_winner() {
        let (ctx, _dir, project_id) = test_context("PERSON", 0.95);
        let sample_id = add_sample(&ctx, project_id);

        let (a, b) = tokio::join!(
            process_sample(&ctx, sample_id, "job-a"),
            process_sample(&ctx, sample_id, "job-b"),
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        // Exactly one pipeline transitioned the sample; the other hit the
        // lease and skipped.
        assert!(outcomes.contains(&SampleOutcome::Skipped));
        assert!(outcomes.contains(&SampleOutcome::Accepted));
        let sample = ctx.store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::AutoLabeled);
        let accepts = ctx
            .store
            .audit_history(sample_id)
            .unwrap()
            .iter()
            .filter(|e| e.decision == DecisionKind::Accept)
            .count();
        assert_eq!(accepts, 1);
    }

    #[tokio::test]
    async fn test_model_unavailable_leaves_sample_in_progress() {
        let (mut ctx, _dir, project_id) = test_context("PERSON", 0.95);
        ctx.executor = Arc::new(LabelModelExecutor::with_fallbacks(
            Vec::new(),
            ExecutorConfig {
                timeout_ms: 50,
                max_retries: 0,
                backoff_ms: 1,
            },
        ));
        let sample_id = add_sample(&ctx, project_id);

        let outcome = process_sample(&ctx, sample_id, "job-1").await.unwrap();
        assert_eq!(outcome, SampleOutcome::Failed);

        let sample = ctx.store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::InProgress);

        // Lease released: a later batch can pick it back up.
        ctx.store.acquire_lease(sample_id, "job-2").unwrap();
    }
}
