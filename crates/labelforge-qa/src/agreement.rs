//! Agreement metrics between independent annotations.

use std::collections::BTreeSet;

use labelforge_store::TaskType;

/// Pairwise agreement between two label values, in [0,1].
pub trait AgreementMetric: Send + Sync {
    fn agreement(&self, a: &str, b: &str) -> f64;
}

/// Exact match for categorical labels.
pub struct ExactMatch;

impl AgreementMetric for ExactMatch {
    fn agreement(&self, a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else {
            0.0
        }
    }
}

/// Token-set overlap (Jaccard) for span-style labels, where partial
/// overlap still counts for something.
pub struct TokenOverlap;

impl AgreementMetric for TokenOverlap {
    fn agreement(&self, a: &str, b: &str) -> f64 {
        let set_a: BTreeSet<&str> = a.split_whitespace().collect();
        let set_b: BTreeSet<&str> = b.split_whitespace().collect();
        if set_a.is_empty() && set_b.is_empty() {
            return 1.0;
        }
        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }
}

/// The metric appropriate for a project's task type.
pub fn metric_for(task_type: TaskType) -> Box<dyn AgreementMetric> {
    match task_type {
        TaskType::Classification => Box::new(ExactMatch),
        TaskType::Ner | TaskType::Span => Box::new(TokenOverlap),
    }
}

/// Mean pairwise agreement over all label pairs. Agreement is undefined
/// for a single annotation, so fewer than two labels yields None.
pub fn pairwise_agreement(metric: &dyn AgreementMetric, labels: &[&str]) -> Option<f64> {
    if labels.len() < 2 {
        return None;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..labels.len() {
        for j in (i + 1)..labels.len() {
            total += metric.agreement(labels[i], labels[j]);
            pairs += 1;
        }
    }
    Some(total / pairs as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let metric = ExactMatch;
        assert_eq!(metric.agreement("PERSON", "PERSON"), 1.0);
        assert_eq!(metric.agreement("PERSON", "ORG"), 0.0);
    }

    #[test]
    fn test_token_overlap_partial() {
        let metric = TokenOverlap;
        let score = metric.agreement("Ada Lovelace", "Ada");
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_pairwise_undefined_for_single_annotation() {
        assert_eq!(pairwise_agreement(&ExactMatch, &["PERSON"]), None);
    }

    #[test]
    fn test_pairwise_mean_over_three() {
        // Pairs: (A,A)=1, (A,B)=0, (A,B)=0 -> mean 1/3
        let score = pairwise_agreement(&ExactMatch, &["A", "A", "B"]).unwrap();
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_for_task_type() {
        assert_eq!(
            metric_for(TaskType::Classification).agreement("X", "Y"),
            0.0
        );
        assert!(metric_for(TaskType::Ner).agreement("a b", "b c") > 0.0);
    }
}
