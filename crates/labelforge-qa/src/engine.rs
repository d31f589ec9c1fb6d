//! Quality assurance engine: evaluation, enforcement, metric snapshots.

use serde::Serialize;
use tracing::{info, warn};

use crate::agreement::{metric_for, pairwise_agreement};
use labelforge_core::{ProjectPolicy, Result};
use labelforge_store::{
    Annotation, DecisionKind, NewAuditEntry, QualityMetric, SampleStatus, SqliteStore, TaskType,
};

/// Outcome of evaluating a sample's annotations.
#[derive(Debug, Clone, Serialize)]
pub struct QaReport {
    /// Mean pairwise agreement; None with fewer than two annotations.
    pub agreement_score: Option<f64>,
    /// Agreement fell below the project threshold.
    pub consistency_flag: bool,
    /// A re-review was forced as a result.
    pub review_forced: bool,
}

/// Computes inter-annotator agreement and can override routing by forcing
/// a sample back into review.
pub struct QaEngine;

impl QaEngine {
    /// Evaluate annotations against the project's agreement threshold.
    /// Pure; does not touch the store.
    pub fn evaluate(
        policy: &ProjectPolicy,
        task_type: TaskType,
        annotations: &[Annotation],
    ) -> QaReport {
        let metric = metric_for(task_type);
        let labels: Vec<&str> = annotations.iter().map(|a| a.label.as_str()).collect();
        let agreement_score = pairwise_agreement(metric.as_ref(), &labels);
        let consistency_flag = agreement_score
            .map(|score| score < policy.agreement_threshold)
            .unwrap_or(false);
        QaReport {
            agreement_score,
            consistency_flag,
            review_forced: false,
        }
    }

    /// Evaluate a sample and, on a consistency flag, force a new review
    /// task. QA overrides any earlier Accept decision.
    pub fn enforce(
        store: &SqliteStore,
        policy: &ProjectPolicy,
        task_type: TaskType,
        sample_id: i64,
        actor: &str,
    ) -> Result<QaReport> {
        let annotations = store.annotations_for_sample(sample_id)?;
        let mut report = Self::evaluate(policy, task_type, &annotations);
        if !report.consistency_flag {
            return Ok(report);
        }

        let score = report.agreement_score.unwrap_or(0.0);
        warn!(
            "Sample {} agreement {:.2} below threshold {:.2}",
            sample_id, score, policy.agreement_threshold
        );

        // An open task means the sample is already pending review.
        if store.open_review_task(sample_id)?.is_some() {
            return Ok(report);
        }

        // Human adjudication is terminal: once a reviewer's label is
        // authoritative, the flag is recorded but no further review is
        // forced, otherwise disputed samples would cycle forever.
        if store
            .authoritative_annotation(sample_id)?
            .is_some_and(|a| a.source == labelforge_store::AnnotationSource::Human)
        {
            return Ok(report);
        }

        store.route_to_review(
            sample_id,
            &NewAuditEntry {
                sample_id,
                decision: DecisionKind::QaOverride,
                actor: actor.to_string(),
                confidence: None,
                context_hash: None,
                policy_version: policy.policy_version,
                resulting_status: SampleStatus::PendingReview,
                detail: Some(format!(
                    "agreement {:.2} below threshold {:.2}",
                    score, policy.agreement_threshold
                )),
            },
        )?;
        report.review_forced = true;
        info!("Forced re-review of sample {}", sample_id);
        Ok(report)
    }

    /// Recompute the project-level quality metric from a sliding window of
    /// recently decided samples and append it as a new snapshot. Used for
    /// reporting; never blocks individual decisions.
    pub fn recompute_metrics(
        store: &SqliteStore,
        project_id: i64,
        window: usize,
    ) -> Result<QualityMetric> {
        let project = store
            .get_project(project_id)?
            .ok_or_else(|| labelforge_core::Error::NotFound(format!("project {}", project_id)))?;
        let metric = metric_for(project.task_type);

        let sample_ids = store.recent_decided_samples(project_id, window)?;
        let mut scores = Vec::new();
        let mut flags = 0i64;
        for sample_id in &sample_ids {
            let annotations = store.annotations_for_sample(*sample_id)?;
            let labels: Vec<&str> = annotations.iter().map(|a| a.label.as_str()).collect();
            if let Some(score) = pairwise_agreement(metric.as_ref(), &labels) {
                if score < project.agreement_threshold {
                    flags += 1;
                }
                scores.push(score);
            }
        }

        // No multiply-annotated samples in the window reads as full agreement.
        let agreement = if scores.is_empty() {
            1.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        store.append_quality_metric(project_id, window as i64, agreement, flags)?;
        let snapshot = store
            .latest_quality_metric(project_id)?
            .ok_or_else(|| labelforge_core::Error::Database("metric snapshot missing".into()))?;
        info!(
            "Quality metrics for project {}: agreement {:.2}, {} flags over {} samples",
            project_id,
            agreement,
            flags,
            sample_ids.len()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelforge_store::{AnnotationSource, NewAnnotation, NewProject};

    fn test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn test_project(store: &SqliteStore, agreement_threshold: f64) -> i64 {
        store
            .create_project(NewProject {
                name: "qa".into(),
                task_type: TaskType::Classification,
                label_schema: vec!["PERSON".into(), "ORG".into()],
                confidence_threshold: 0.9,
                require_double_annotation: true,
                agreement_threshold,
            })
            .unwrap()
    }

    fn annotate(store: &SqliteStore, sample_id: i64, label: &str, producer: &str) {
        store
            .add_annotation(&NewAnnotation {
                sample_id,
                label: label.into(),
                source: AnnotationSource::Human,
                confidence: None,
                producer: producer.into(),
            })
            .unwrap();
    }

    #[test]
    fn test_single_annotation_never_flags() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store, 0.8);
        let policy = store.project_policy(project_id).unwrap();
        let sample_id = store.add_sample(project_id, "ref", None, "test").unwrap();
        annotate(&store, sample_id, "PERSON", "alice");

        let report = QaEngine::enforce(
            &store,
            &policy,
            TaskType::Classification,
            sample_id,
            "qa-engine",
        )
        .unwrap();
        assert_eq!(report.agreement_score, None);
        assert!(!report.consistency_flag);
        assert!(!report.review_forced);
    }

    #[test]
    fn test_disagreement_forces_review_over_prior_accept() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store, 0.8);
        let policy = store.project_policy(project_id).unwrap();
        let sample_id = store.add_sample(project_id, "ref", None, "test").unwrap();

        // Sample previously auto-accepted
        store
            .transition_sample(
                sample_id,
                SampleStatus::AutoLabeled,
                &NewAuditEntry {
                    sample_id,
                    decision: DecisionKind::Accept,
                    actor: "router".into(),
                    confidence: Some(0.95),
                    context_hash: None,
                    policy_version: 1,
                    resulting_status: SampleStatus::AutoLabeled,
                    detail: None,
                },
            )
            .unwrap();

        annotate(&store, sample_id, "PERSON", "alice");
        annotate(&store, sample_id, "ORG", "bob");

        let report = QaEngine::enforce(
            &store,
            &policy,
            TaskType::Classification,
            sample_id,
            "qa-engine",
        )
        .unwrap();
        assert_eq!(report.agreement_score, Some(0.0));
        assert!(report.consistency_flag);
        assert!(report.review_forced);

        let sample = store.get_sample(sample_id).unwrap().unwrap();
        assert_eq!(sample.status, SampleStatus::PendingReview);
        assert!(store.open_review_task(sample_id).unwrap().is_some());

        let history = store.audit_history(sample_id).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.decision, DecisionKind::QaOverride);
        assert_eq!(last.resulting_status, SampleStatus::PendingReview);
    }

    #[test]
    fn test_enforce_does_not_duplicate_open_review() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store, 0.8);
        let policy = store.project_policy(project_id).unwrap();
        let sample_id = store.add_sample(project_id, "ref", None, "test").unwrap();
        annotate(&store, sample_id, "PERSON", "alice");
        annotate(&store, sample_id, "ORG", "bob");

        QaEngine::enforce(&store, &policy, TaskType::Classification, sample_id, "qa").unwrap();
        let report =
            QaEngine::enforce(&store, &policy, TaskType::Classification, sample_id, "qa")
                .unwrap();
        assert!(report.consistency_flag);
        assert!(!report.review_forced);
        assert_eq!(store.open_review_tasks().unwrap().len(), 1);
    }

    #[test]
    fn test_agreeing_annotations_pass() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store, 0.8);
        let policy = store.project_policy(project_id).unwrap();
        let sample_id = store.add_sample(project_id, "ref", None, "test").unwrap();
        annotate(&store, sample_id, "PERSON", "alice");
        annotate(&store, sample_id, "PERSON", "bob");

        let report = QaEngine::enforce(
            &store,
            &policy,
            TaskType::Classification,
            sample_id,
            "qa-engine",
        )
        .unwrap();
        assert_eq!(report.agreement_score, Some(1.0));
        assert!(!report.consistency_flag);
    }

    #[test]
    fn test_recompute_metrics_appends_snapshot() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store, 0.8);
        let sample_id = store.add_sample(project_id, "ref", None, "test").unwrap();
        store
            .transition_sample(
                sample_id,
                SampleStatus::Reviewed,
                &NewAuditEntry {
                    sample_id,
                    decision: DecisionKind::HumanReview,
                    actor: "alice".into(),
                    confidence: None,
                    context_hash: None,
                    policy_version: 1,
                    resulting_status: SampleStatus::Reviewed,
                    detail: None,
                },
            )
            .unwrap();
        annotate(&store, sample_id, "PERSON", "alice");
        annotate(&store, sample_id, "ORG", "bob");

        let snapshot = QaEngine::recompute_metrics(&store, project_id, 50).unwrap();
        assert_eq!(snapshot.agreement_score, 0.0);
        assert_eq!(snapshot.flag_count, 1);
        assert_eq!(snapshot.window_size, 50);
    }
}
