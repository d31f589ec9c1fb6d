//! Greedy uncertainty + diversity batch selection.

use tracing::debug;

use crate::signature::jaccard;
use labelforge_core::{Error, Result};
use labelforge_store::{SelectionCandidate, SqliteStore};

/// Scores how much labeling a candidate next would improve the model.
/// Higher is more urgent.
pub trait UncertaintyScorer: Send + Sync {
    fn score(&self, candidate: &SelectionCandidate) -> f64;
}

/// Default scorer: inverted distance of the most recent model confidence
/// from 0.5, so a 0.5-confidence prediction is maximally uncertain.
/// Samples the model has never attempted get a configured default.
pub struct ConfidenceMarginScorer {
    pub default_uncertainty: f64,
}

impl UncertaintyScorer for ConfidenceMarginScorer {
    fn score(&self, candidate: &SelectionCandidate) -> f64 {
        match candidate.last_confidence {
            Some(c) => 1.0 - 2.0 * (c - 0.5).abs(),
            None => self.default_uncertainty,
        }
    }
}

/// Selector configuration, snapshotted per batch.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Uncertainty assigned to never-attempted samples.
    pub default_uncertainty: f64,
    /// Candidates at or above this Jaccard similarity to any already-chosen
    /// sample are skipped.
    pub similarity_cap: f64,
    /// When off, selection degrades to oldest-first by id.
    pub active_learning: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            default_uncertainty: 1.0,
            similarity_cap: 0.8,
            active_learning: true,
        }
    }
}

/// Chooses which unlabeled samples to process next.
pub struct ActiveLearningSelector {
    config: SelectorConfig,
    scorer: Box<dyn UncertaintyScorer>,
}

impl ActiveLearningSelector {
    pub fn new(config: SelectorConfig) -> Self {
        let scorer = Box::new(ConfidenceMarginScorer {
            default_uncertainty: config.default_uncertainty,
        });
        Self { config, scorer }
    }

    /// Swap in a different scoring strategy.
    pub fn with_scorer(config: SelectorConfig, scorer: Box<dyn UncertaintyScorer>) -> Self {
        Self { config, scorer }
    }

    /// Select up to `batch_size` unlabeled samples for a project.
    ///
    /// Greedy: take the highest-uncertainty candidate, then repeatedly the
    /// next-highest whose similarity to everything already chosen stays
    /// below the cap. Ties break by sample id ascending.
    pub fn select_batch(
        &self,
        store: &SqliteStore,
        project_id: i64,
        batch_size: usize,
    ) -> Result<Vec<i64>> {
        let candidates = store.selection_candidates(project_id)?;
        if candidates.is_empty() {
            return Err(Error::EmptyPool(project_id));
        }

        if !self.config.active_learning {
            // Oldest-first; candidates arrive ordered by id already.
            return Ok(candidates
                .iter()
                .take(batch_size)
                .map(|c| c.sample_id)
                .collect());
        }

        let mut scored: Vec<(f64, SelectionCandidate)> = candidates
            .into_iter()
            .map(|c| (self.scorer.score(&c), c))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.sample_id.cmp(&b.1.sample_id))
        });

        let mut chosen: Vec<SelectionCandidate> = Vec::with_capacity(batch_size);
        for (score, candidate) in scored {
            if chosen.len() >= batch_size {
                break;
            }
            if self.too_similar(&candidate, &chosen) {
                debug!(
                    "Skipping sample {} (near-duplicate of an already-selected sample)",
                    candidate.sample_id
                );
                continue;
            }
            debug!(
                "Selected sample {} (uncertainty {:.3})",
                candidate.sample_id, score
            );
            chosen.push(candidate);
        }

        Ok(chosen.into_iter().map(|c| c.sample_id).collect())
    }

    fn too_similar(&self, candidate: &SelectionCandidate, chosen: &[SelectionCandidate]) -> bool {
        let sig = match candidate.signature.as_deref() {
            Some(s) if !s.is_empty() => s,
            // Unsigned samples cannot be compared; always admissible.
            _ => return false,
        };
        chosen.iter().any(|picked| {
            picked
                .signature
                .as_deref()
                .is_some_and(|other| jaccard(sig, other) >= self.config.similarity_cap)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::token_signature;
    use labelforge_store::{AnnotationSource, NewAnnotation, NewProject, TaskType};

    fn test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn test_project(store: &SqliteStore) -> i64 {
        store
            .create_project(NewProject {
                name: "docs".into(),
                task_type: TaskType::Classification,
                label_schema: vec!["INVOICE".into(), "RECEIPT".into()],
                confidence_threshold: 0.9,
                require_double_annotation: false,
                agreement_threshold: 0.8,
            })
            .unwrap()
    }

    fn add_sample(store: &SqliteStore, project_id: i64, content: &str) -> i64 {
        store
            .add_sample(
                project_id,
                content,
                Some(&token_signature(content)),
                "test",
            )
            .unwrap()
    }

    fn record_confidence(store: &SqliteStore, sample_id: i64, confidence: f64) {
        store
            .add_annotation(&NewAnnotation {
                sample_id,
                label: "INVOICE".into(),
                source: AnnotationSource::Model,
                confidence: Some(confidence),
                producer: "model-a".into(),
            })
            .unwrap();
    }

    #[test]
    fn test_empty_pool() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store);
        let selector = ActiveLearningSelector::new(SelectorConfig::default());
        let err = selector.select_batch(&store, project_id, 5).unwrap_err();
        assert!(matches!(err, Error::EmptyPool(id) if id == project_id));
    }

    #[test]
    fn test_most_uncertain_first() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store);
        let confident = add_sample(&store, project_id, "monthly invoice from acme");
        let uncertain = add_sample(&store, project_id, "handwritten receipt photo");
        record_confidence(&store, confident, 0.95);
        record_confidence(&store, uncertain, 0.52);

        let selector = ActiveLearningSelector::new(SelectorConfig::default());
        let batch = selector.select_batch(&store, project_id, 2).unwrap();
        assert_eq!(batch[0], uncertain);
        assert_eq!(batch[1], confident);
    }

    #[test]
    fn test_never_seen_samples_rank_highest() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store);
        let seen = add_sample(&store, project_id, "quarterly statement alpha");
        let fresh = add_sample(&store, project_id, "unrelated shipping manifest");
        record_confidence(&store, seen, 0.5);

        // Never-seen gets default_uncertainty 1.0, equal to a 0.5-confidence
        // sample; the tie breaks by id, so `seen` (lower id) still leads.
        let selector = ActiveLearningSelector::new(SelectorConfig::default());
        let batch = selector.select_batch(&store, project_id, 2).unwrap();
        assert_eq!(batch, vec![seen, fresh]);
    }

    #[test]
    fn test_diversity_cap_skips_near_duplicates() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store);
        let a = add_sample(&store, project_id, "invoice from acme corp march");
        let duplicate = add_sample(&store, project_id, "invoice from acme corp march");
        let distinct = add_sample(&store, project_id, "travel expense report berlin");

        let selector = ActiveLearningSelector::new(SelectorConfig::default());
        let batch = selector.select_batch(&store, project_id, 2).unwrap();
        assert_eq!(batch, vec![a, distinct]);

        // With a larger budget the duplicate is still excluded this batch
        let batch = selector.select_batch(&store, project_id, 3).unwrap();
        assert!(!batch.contains(&duplicate));
    }

    #[test]
    fn test_active_learning_disabled_is_id_order() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store);
        let a = add_sample(&store, project_id, "first");
        let b = add_sample(&store, project_id, "second");
        let c = add_sample(&store, project_id, "third");
        record_confidence(&store, a, 0.99);

        let selector = ActiveLearningSelector::new(SelectorConfig {
            active_learning: false,
            ..Default::default()
        });
        let batch = selector.select_batch(&store, project_id, 2).unwrap();
        assert_eq!(batch, vec![a, b]);
        let batch = selector.select_batch(&store, project_id, 10).unwrap();
        assert_eq!(batch, vec![a, b, c]);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let (store, _dir) = test_store();
        let project_id = test_project(&store);
        for i in 0..6 {
            add_sample(&store, project_id, &format!("wholly unique document {}", i));
        }

        let selector = ActiveLearningSelector::new(SelectorConfig::default());
        let first = selector.select_batch(&store, project_id, 4).unwrap();
        let second = selector.select_batch(&store, project_id, 4).unwrap();
        assert_eq!(first, second);
    }
}
