//! LabelForge Context — business-entity enrichment via an external provider.

pub mod injector;
pub mod provider;

pub use injector::{ContextInjector, ContextOutcome};
pub use provider::{ContextProvider, HttpContextProvider, StaticContextProvider};
