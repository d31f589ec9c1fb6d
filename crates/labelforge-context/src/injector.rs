//! Context injection with graceful degradation.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::provider::ContextProvider;
use labelforge_core::Result;
use labelforge_store::{Sample, SqliteStore};

/// Result of enriching a sample: a stored, content-addressed snapshot, or
/// nothing if the provider was unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextOutcome {
    Snapshot {
        id: i64,
        content_hash: String,
        entities: serde_json::Value,
    },
    NoContext,
}

impl ContextOutcome {
    pub fn content_hash(&self) -> Option<&str> {
        match self {
            Self::Snapshot { content_hash, .. } => Some(content_hash),
            Self::NoContext => None,
        }
    }

    pub fn entities(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Snapshot { entities, .. } => Some(entities),
            Self::NoContext => None,
        }
    }
}

/// Queries the external Context Provider with a timeout and stores the
/// result content-addressed. Provider failures never reach the caller.
pub struct ContextInjector {
    provider: Option<Arc<dyn ContextProvider>>,
    timeout: Duration,
}

impl ContextInjector {
    pub fn new(provider: Arc<dyn ContextProvider>, timeout_ms: u64) -> Self {
        Self {
            provider: Some(provider),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Injector with no provider configured; every sample gets `NoContext`.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            timeout: Duration::ZERO,
        }
    }

    /// Enrich a sample. Only storage failures propagate; provider errors
    /// and timeouts degrade to `NoContext`.
    pub async fn enrich(&self, store: &SqliteStore, sample: &Sample) -> Result<ContextOutcome> {
        let provider = match &self.provider {
            Some(p) => p,
            None => return Ok(ContextOutcome::NoContext),
        };

        let entities =
            match tokio::time::timeout(self.timeout, provider.query(&sample.content_ref)).await {
                Ok(Ok(entities)) => entities,
                Ok(Err(e)) => {
                    warn!(
                        "Context provider '{}' failed for sample {}: {}",
                        provider.name(),
                        sample.id,
                        e
                    );
                    return Ok(ContextOutcome::NoContext);
                }
                Err(_) => {
                    warn!(
                        "Context provider '{}' timed out for sample {} after {:?}",
                        provider.name(),
                        sample.id,
                        self.timeout
                    );
                    return Ok(ContextOutcome::NoContext);
                }
            };

        let serialized = serde_json::to_string(&entities)?;
        let content_hash = hex::encode(Sha256::digest(serialized.as_bytes()));
        let id = store.put_context_snapshot(&content_hash, &entities)?;
        debug!("Sample {} enriched with context {}", sample.id, content_hash);
        Ok(ContextOutcome::Snapshot {
            id,
            content_hash,
            entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticContextProvider;
    use async_trait::async_trait;
    use labelforge_core::Error;
    use labelforge_store::{NewProject, TaskType};

    struct FailingProvider;

    #[async_trait]
    impl ContextProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn query(&self, _content_ref: &str) -> labelforge_core::Result<serde_json::Value> {
            Err(Error::Provider("connection refused".into()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl ContextProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn query(&self, _content_ref: &str) -> labelforge_core::Result<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(serde_json::json!({}))
        }
    }

    fn test_sample(store: &SqliteStore) -> Sample {
        let project_id = store
            .create_project(NewProject {
                name: "p".into(),
                task_type: TaskType::Ner,
                label_schema: vec!["PERSON".into()],
                confidence_threshold: 0.9,
                require_double_annotation: false,
                agreement_threshold: 0.8,
            })
            .unwrap();
        let sample_id = store
            .add_sample(project_id, "Ada Lovelace wrote the first program", None, "test")
            .unwrap();
        store.get_sample(sample_id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_enrich_stores_snapshot_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let sample = test_sample(&store);

        let entities = serde_json::json!({"PERSON": ["Ada Lovelace"]});
        let injector = ContextInjector::new(
            Arc::new(StaticContextProvider::new(entities)),
            1_000,
        );

        let first = injector.enrich(&store, &sample).await.unwrap();
        let second = injector.enrich(&store, &sample).await.unwrap();
        // Identical context content-addresses to the same snapshot.
        assert_eq!(first, second);

        let hash = first.content_hash().unwrap();
        let snapshot = store.get_context_snapshot(hash).unwrap().unwrap();
        assert_eq!(snapshot.entities["PERSON"][0], "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_provider_error_degrades_to_no_context() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let sample = test_sample(&store);

        let injector = ContextInjector::new(Arc::new(FailingProvider), 1_000);
        let outcome = injector.enrich(&store, &sample).await.unwrap();
        assert_eq!(outcome, ContextOutcome::NoContext);
    }

    #[tokio::test]
    async fn test_provider_timeout_degrades_to_no_context() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let sample = test_sample(&store);

        let injector = ContextInjector::new(Arc::new(SlowProvider), 50);
        let outcome = injector.enrich(&store, &sample).await.unwrap();
        assert_eq!(outcome, ContextOutcome::NoContext);
    }

    #[tokio::test]
    async fn test_disabled_injector() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let sample = test_sample(&store);

        let outcome = ContextInjector::disabled()
            .enrich(&store, &sample)
            .await
            .unwrap();
        assert_eq!(outcome, ContextOutcome::NoContext);
    }
}
