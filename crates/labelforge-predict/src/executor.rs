//! Prediction execution: per-attempt timeout, exponential backoff, and an
//! ordered fallback chain.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::provider::{LabelModelProvider, Prediction};
use labelforge_core::{Error, Result};

/// Retry/timeout settings for prediction attempts.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout for a single provider call, in milliseconds.
    pub timeout_ms: u64,
    /// Retries per provider after the first attempt.
    pub max_retries: u32,
    /// Initial backoff between retries; doubles each attempt.
    pub backoff_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 2,
            backoff_ms: 200,
        }
    }
}

/// Invokes label model providers in order until one yields a usable
/// prediction. Exhausting every provider is `ModelUnavailable`.
pub struct LabelModelExecutor {
    providers: Vec<Arc<dyn LabelModelProvider>>,
    config: ExecutorConfig,
}

impl LabelModelExecutor {
    pub fn new(primary: Arc<dyn LabelModelProvider>, config: ExecutorConfig) -> Self {
        Self {
            providers: vec![primary],
            config,
        }
    }

    /// Executor with an ordered fallback chain; the first provider is
    /// primary.
    pub fn with_fallbacks(
        providers: Vec<Arc<dyn LabelModelProvider>>,
        config: ExecutorConfig,
    ) -> Self {
        Self { providers, config }
    }

    /// Obtain a prediction for a sample. A provider answer with a
    /// non-finite or out-of-range confidence counts as a failed attempt.
    pub async fn predict(
        &self,
        content_ref: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<Prediction> {
        if self.providers.is_empty() {
            return Err(Error::ModelUnavailable("no providers configured".into()));
        }

        for (index, provider) in self.providers.iter().enumerate() {
            if index > 0 {
                info!("Falling back to label model provider '{}'", provider.name());
            }
            match self.attempt_provider(provider.as_ref(), content_ref, context).await {
                Ok(prediction) => return Ok(prediction),
                Err(e) => {
                    warn!(
                        "Label model provider '{}' exhausted: {}",
                        provider.name(),
                        e
                    );
                }
            }
        }

        let tried: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        Err(Error::ModelUnavailable(format!(
            "all providers failed: {}",
            tried.join(", ")
        )))
    }

    /// Run one provider through its retry budget.
    async fn attempt_provider(
        &self,
        provider: &dyn LabelModelProvider,
        content_ref: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<Prediction> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut backoff = Duration::from_millis(self.config.backoff_ms);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(
                    "Retrying provider '{}' (attempt {}/{})",
                    provider.name(),
                    attempt + 1,
                    self.config.max_retries + 1
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let result = match tokio::time::timeout(
                timeout,
                provider.predict(content_ref, context),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::ProviderTimeout(self.config.timeout_ms)),
            };

            match result.and_then(validate_confidence) {
                Ok(prediction) => return Ok(prediction),
                Err(e) => {
                    warn!(
                        "Provider '{}' attempt {} failed: {}",
                        provider.name(),
                        attempt + 1,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Provider("no attempts were made".into())))
    }
}

/// Reject non-finite or out-of-range confidence, then clamp to guard
/// against floating-point fuzz at the boundaries.
fn validate_confidence(mut prediction: Prediction) -> Result<Prediction> {
    if !prediction.confidence.is_finite()
        || prediction.confidence < 0.0
        || prediction.confidence > 1.0
    {
        return Err(Error::Provider(format!(
            "confidence {} outside [0,1]",
            prediction.confidence
        )));
    }
    prediction.confidence = prediction.confidence.clamp(0.0, 1.0);
    Ok(prediction)
}
