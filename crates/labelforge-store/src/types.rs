//! Row types for projects, samples, annotations, and the audit ledger.

use serde::{Deserialize, Serialize};

/// Annotation task kind for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Ner,
    Span,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Ner => "ner",
            Self::Span => "span",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "classification" => Some(Self::Classification),
            "ner" => Some(Self::Ner),
            "span" => Some(Self::Span),
            _ => None,
        }
    }
}

/// Lifecycle state of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Unlabeled,
    InProgress,
    AutoLabeled,
    PendingReview,
    Reviewed,
    Rejected,
}

impl SampleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlabeled => "unlabeled",
            Self::InProgress => "inprogress",
            Self::AutoLabeled => "autolabeled",
            Self::PendingReview => "pendingreview",
            Self::Reviewed => "reviewed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unlabeled" => Some(Self::Unlabeled),
            "inprogress" => Some(Self::InProgress),
            "autolabeled" => Some(Self::AutoLabeled),
            "pendingreview" => Some(Self::PendingReview),
            "reviewed" => Some(Self::Reviewed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Terminal per-sample outcomes from a batch's point of view.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AutoLabeled | Self::PendingReview | Self::Reviewed | Self::Rejected
        )
    }
}

impl std::fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSource {
    Model,
    Human,
}

impl AnnotationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Human => "human",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model" => Some(Self::Model),
            "human" => Some(Self::Human),
            _ => None,
        }
    }
}

/// Kind of state-changing decision recorded in the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    /// Sample imported into the project.
    Imported,
    /// Pipeline leased the sample and began processing.
    Started,
    /// Model prediction accepted automatically.
    Accept,
    /// Routed to human review.
    Review,
    /// Predicted label outside the project schema.
    SchemaViolation,
    /// Quality assurance forced a re-review.
    QaOverride,
    /// Human reviewer resolved a review task.
    HumanReview,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Started => "started",
            Self::Accept => "accept",
            Self::Review => "review",
            Self::SchemaViolation => "schemaviolation",
            Self::QaOverride => "qaoverride",
            Self::HumanReview => "humanreview",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "imported" => Some(Self::Imported),
            "started" => Some(Self::Started),
            "accept" => Some(Self::Accept),
            "review" => Some(Self::Review),
            "schemaviolation" => Some(Self::SchemaViolation),
            "qaoverride" => Some(Self::QaOverride),
            "humanreview" => Some(Self::HumanReview),
            _ => None,
        }
    }
}

/// A project row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub task_type: TaskType,
    pub label_schema: Vec<String>,
    pub confidence_threshold: f64,
    pub require_double_annotation: bool,
    pub agreement_threshold: f64,
    pub policy_version: i64,
    pub created_at: i64,
}

/// A sample row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: i64,
    pub project_id: i64,
    pub content_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub status: SampleStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// An annotation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: i64,
    pub sample_id: i64,
    pub label: String,
    pub source: AnnotationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub producer: String,
    pub authoritative: bool,
    pub created_at: i64,
}

/// Input for inserting an annotation.
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub sample_id: i64,
    pub label: String,
    pub source: AnnotationSource,
    /// Only meaningful for model annotations; must be None for human ones.
    pub confidence: Option<f64>,
    pub producer: String,
}

/// A review task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewTask {
    pub id: i64,
    pub sample_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// A stored context snapshot, content-addressed by hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: i64,
    pub content_hash: String,
    pub entities: serde_json::Value,
    pub created_at: i64,
}

/// An append-only quality metric snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetric {
    pub id: i64,
    pub project_id: i64,
    pub window_size: i64,
    pub agreement_score: f64,
    pub flag_count: i64,
    pub computed_at: i64,
}

/// An audit ledger entry. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub sample_id: i64,
    pub decision: DecisionKind,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_hash: Option<String>,
    pub policy_version: i64,
    pub resulting_status: SampleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: i64,
}

/// Input for appending an audit entry.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub sample_id: i64,
    pub decision: DecisionKind,
    pub actor: String,
    pub confidence: Option<f64>,
    pub context_hash: Option<String>,
    pub policy_version: i64,
    pub resulting_status: SampleStatus,
    pub detail: Option<String>,
}

/// Input for creating a project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub task_type: TaskType,
    pub label_schema: Vec<String>,
    pub confidence_threshold: f64,
    pub require_double_annotation: bool,
    pub agreement_threshold: f64,
}

/// An unlabeled sample as seen by the selector: its similarity signature
/// and the most recent model confidence recorded for it, if any.
#[derive(Debug, Clone)]
pub struct SelectionCandidate {
    pub sample_id: i64,
    pub signature: Option<String>,
    pub last_confidence: Option<f64>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_projects: i64,
    pub total_samples: i64,
    pub total_annotations: i64,
    pub open_review_tasks: i64,
    pub audit_entries: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}
