//! Context Provider trait and implementations.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use labelforge_core::{Error, Result};

/// External service supplying business-entity context for a sample,
/// analogous to a knowledge graph. Best effort: the injector swallows
/// every failure from here.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Provider name, for logging and audit detail.
    fn name(&self) -> &str;

    /// Query entity context for a sample's content. The returned value is
    /// a JSON object mapping entity type to recognized entities.
    async fn query(&self, content_ref: &str) -> Result<serde_json::Value>;
}

/// HTTP context provider: POSTs the content reference, expects a JSON
/// object of entities back.
pub struct HttpContextProvider {
    client: reqwest::Client,
    endpoint: String,
    name: String,
}

impl HttpContextProvider {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let name = format!("http:{}", endpoint);
        Self {
            client,
            endpoint,
            name,
        }
    }
}

#[async_trait]
impl ContextProvider for HttpContextProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, content_ref: &str) -> Result<serde_json::Value> {
        debug!("Querying context provider at {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "content": content_ref }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ProviderTimeout(0)
                } else {
                    Error::Provider(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "context provider returned {}",
                response.status()
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::Provider(e.to_string()))
    }
}

/// Fixed-response provider for tests and offline runs.
pub struct StaticContextProvider {
    entities: serde_json::Value,
}

impl StaticContextProvider {
    pub fn new(entities: serde_json::Value) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn query(&self, _content_ref: &str) -> Result<serde_json::Value> {
        Ok(self.entities.clone())
    }
}
