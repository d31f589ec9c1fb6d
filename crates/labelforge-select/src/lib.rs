//! LabelForge Select — active-learning batch selection.

pub mod selector;
pub mod signature;

pub use selector::{ActiveLearningSelector, ConfidenceMarginScorer, SelectorConfig, UncertaintyScorer};
pub use signature::{jaccard, token_signature};
