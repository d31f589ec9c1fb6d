//! LabelForge Core — error taxonomy, engine configuration, policy snapshots.

pub mod config;
pub mod error;

pub use config::{EngineConfig, ProjectPolicy};
pub use error::{Error, Result};
