//! Shared application state.

use std::sync::Arc;

use tracing::{info, warn};

use labelforge_context::{ContextInjector, HttpContextProvider};
use labelforge_core::{EngineConfig, Result};
use labelforge_predict::{ExecutorConfig, HttpLabelModelProvider, LabelModelExecutor, LabelModelProvider};
use labelforge_runtime::Engine;
use labelforge_store::SqliteStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: EngineConfig,
    pub engine: Engine,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.data_dir)?);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.provider_timeout_ms))
            .build()
            .map_err(|e| labelforge_core::Error::Config(format!("http client: {}", e)))?;

        let injector = match std::env::var("LABELFORGE_CONTEXT_ENDPOINT") {
            Ok(endpoint) if !endpoint.is_empty() => {
                info!("Context provider: {}", endpoint);
                Arc::new(ContextInjector::new(
                    Arc::new(HttpContextProvider::new(client.clone(), endpoint)),
                    config.provider_timeout_ms,
                ))
            }
            _ => {
                info!("No context provider configured; samples run without context");
                Arc::new(ContextInjector::disabled())
            }
        };

        // Comma-separated endpoints: the first is primary, the rest are
        // fallbacks in order.
        let providers: Vec<Arc<dyn LabelModelProvider>> =
            match std::env::var("LABELFORGE_MODEL_ENDPOINTS") {
                Ok(endpoints) => endpoints
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(|e| {
                        Arc::new(HttpLabelModelProvider::new(client.clone(), e))
                            as Arc<dyn LabelModelProvider>
                    })
                    .collect(),
                Err(_) => Vec::new(),
            };
        if providers.is_empty() {
            warn!("No label model providers configured; batches will fail until LABELFORGE_MODEL_ENDPOINTS is set");
        } else {
            info!("{} label model provider(s) configured", providers.len());
        }
        let executor = Arc::new(LabelModelExecutor::with_fallbacks(
            providers,
            ExecutorConfig {
                timeout_ms: config.provider_timeout_ms,
                max_retries: config.predict_max_retries,
                backoff_ms: config.predict_backoff_ms,
            },
        ));

        let engine = Engine::new(config.clone(), store, injector, executor);
        Ok(Self { config, engine })
    }
}
