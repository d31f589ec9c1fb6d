//! LabelForge QA — inter-annotator agreement and consistency enforcement.

pub mod agreement;
pub mod engine;

pub use agreement::{metric_for, AgreementMetric, ExactMatch, TokenOverlap};
pub use engine::{QaEngine, QaReport};
