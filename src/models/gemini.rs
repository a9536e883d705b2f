use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{rate_limited, ModelClient};
use crate::config::FirmModelConfig;
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};

/// Google Gemini generateContent client.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(model: &str, config: &FirmModelConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(TipsterError::InvalidConfig(format!(
                "missing API key for model {model}"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(TipsterError::Http)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: model.to_string(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"response_mime_type": "application/json"},
        });

        let response = self.http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if rate_limited(status, &text) {
            return Err(TipsterError::RateLimited(format!(
                "{} returned {status}",
                self.model
            )));
        }
        if status.is_server_error() {
            return Err(TipsterError::Transient(format!(
                "{} returned {status}",
                self.model
            )));
        }
        if !status.is_success() {
            return Err(TipsterError::Internal(format!(
                "{} returned {status}: {text}",
                self.model
            )));
        }

        let payload: serde_json::Value = serde_json::from_str(&text)?;
        let content = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TipsterError::Schema(format!("{}: response had no candidates", self.model))
            })?;

        serde_json::from_str(content)
            .map_err(|e| TipsterError::Schema(format!("{}: decision is not JSON: {e}", self.model)))
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn predict(&self, prompt: &str) -> Result<serde_json::Value> {
        retry::with_backoff(
            RetryPolicy::model(),
            "model predict",
            retry::retry_transient,
            || self.generate(prompt),
        )
        .await
    }
}
