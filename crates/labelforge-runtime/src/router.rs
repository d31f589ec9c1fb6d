//! Confidence-based routing of predictions.

use serde::Serialize;

use labelforge_core::ProjectPolicy;
use labelforge_predict::Prediction;

/// Routing decision for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Review,
    Reject,
}

/// Pure routing policy: a function of the batch's policy snapshot and the
/// prediction, nothing else.
pub struct ConfidenceRouter;

impl ConfidenceRouter {
    pub fn route(policy: &ProjectPolicy, prediction: &Prediction) -> Decision {
        // A label outside the schema is a data error, not a confidence
        // issue; it never reaches the threshold comparison.
        if !policy.allows_label(&prediction.label) {
            return Decision::Reject;
        }
        if prediction.confidence >= policy.confidence_threshold {
            if policy.require_double_annotation {
                Decision::Review
            } else {
                Decision::Accept
            }
        } else {
            Decision::Review
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(threshold: f64, double: bool) -> ProjectPolicy {
        ProjectPolicy {
            project_id: 1,
            confidence_threshold: threshold,
            require_double_annotation: double,
            agreement_threshold: 0.8,
            label_schema: vec![
                "PERSON".into(),
                "ORG".into(),
                "PRODUCT".into(),
                "LOCATION".into(),
            ],
            policy_version: 1,
        }
    }

    fn prediction(label: &str, confidence: f64) -> Prediction {
        Prediction {
            label: label.into(),
            confidence,
            producer: "model-a".into(),
        }
    }

    #[test]
    fn test_high_confidence_accepts() {
        let decision = ConfidenceRouter::route(&policy(0.9, false), &prediction("PERSON", 0.95));
        assert_eq!(decision, Decision::Accept);
    }

    #[test]
    fn test_low_confidence_reviews() {
        let decision = ConfidenceRouter::route(&policy(0.9, false), &prediction("PERSON", 0.6));
        assert_eq!(decision, Decision::Review);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let decision = ConfidenceRouter::route(&policy(0.9, false), &prediction("ORG", 0.9));
        assert_eq!(decision, Decision::Accept);
    }

    #[test]
    fn test_double_annotation_forces_review_despite_confidence() {
        let decision = ConfidenceRouter::route(&policy(0.9, true), &prediction("PERSON", 0.99));
        assert_eq!(decision, Decision::Review);
    }

    #[test]
    fn test_unknown_label_rejects_regardless_of_confidence() {
        let decision = ConfidenceRouter::route(&policy(0.9, false), &prediction("ALIEN", 0.99));
        assert_eq!(decision, Decision::Reject);
    }
}
