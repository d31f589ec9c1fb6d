//! LabelForge Runtime — routing, the per-sample pipeline, batch scheduling,
//! export, and the engine facade.

pub mod engine;
pub mod export;
pub mod pipeline;
pub mod router;
pub mod scheduler;
pub mod types;

pub use engine::{Engine, EngineStatus};
pub use router::{ConfidenceRouter, Decision};
pub use scheduler::JobScheduler;
pub use types::*;
