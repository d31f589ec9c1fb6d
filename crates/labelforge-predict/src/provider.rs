//! Label Model Provider trait and implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use labelforge_core::{Error, Result};

/// A label prediction with its model confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
    /// Provider that produced this prediction.
    pub producer: String,
}

/// External service producing a label prediction and confidence score.
#[async_trait]
pub trait LabelModelProvider: Send + Sync {
    /// Provider name, recorded as the annotation producer.
    fn name(&self) -> &str;

    /// Predict a label for a sample's content, optionally with entity
    /// context from the Context Provider.
    async fn predict(
        &self,
        content_ref: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<Prediction>;
}

#[derive(Deserialize)]
struct PredictResponse {
    label: String,
    confidence: f64,
}

/// HTTP label model provider: POSTs content + context, expects
/// `{"label": ..., "confidence": ...}` back.
pub struct HttpLabelModelProvider {
    client: reqwest::Client,
    endpoint: String,
    name: String,
}

impl HttpLabelModelProvider {
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
impl LabelModelProvider for HttpLabelModelProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(
        &self,
        content_ref: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<Prediction> {
        debug!("Requesting prediction from {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "content": content_ref, "context": context }))
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
                "label model returned {}",
                response.status()
            )));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        Ok(Prediction {
            label: parsed.label,
            confidence: parsed.confidence,
            producer: self.name.clone(),
        })
    }
}

/// Fixed-response provider for tests and dry runs.
pub struct FixedLabelModelProvider {
    label: String,
    confidence: f64,
    name: String,
}

impl FixedLabelModelProvider {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            name: "fixed".into(),
        }
    }

    pub fn named(label: impl Into<String>, confidence: f64, name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            confidence,
            name: name.into(),
        }
    }
}

#[async_trait]
impl LabelModelProvider for FixedLabelModelProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(
        &self,
        _content_ref: &str,
        _context: Option<&serde_json::Value>,
    ) -> Result<Prediction> {
        Ok(Prediction {
            label: self.label.clone(),
            confidence: self.confidence,
            producer: self.name.clone(),
        })
    }
}
