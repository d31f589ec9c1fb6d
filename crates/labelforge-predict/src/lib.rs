//! LabelForge Predict — label model execution with retry and fallback.

pub mod executor;
pub mod provider;

pub use executor::{ExecutorConfig, LabelModelExecutor};
pub use provider::{FixedLabelModelProvider, HttpLabelModelProvider, LabelModelProvider, Prediction};
