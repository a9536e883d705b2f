use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{rate_limited, ModelClient};
use crate::config::FirmModelConfig;
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};

const SYSTEM_PROMPT: &str =
    "You are an expert trading analyst. Respond in valid JSON format only.";

/// Chat-completions client for every provider speaking the OpenAI dialect.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
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

    async fn complete(&self, prompt: &str) -> Result<serde_json::Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "response_format": {"type": "json_object"},
        });

        let response = self.http
            .post(&url)
            .bearer_auth(&self.api_key)
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
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TipsterError::Schema(format!("{}: response had no message content", self.model))
            })?;

        debug!("{} produced {} bytes of decision JSON", self.model, content.len());
        serde_json::from_str(content)
            .map_err(|e| TipsterError::Schema(format!("{}: decision is not JSON: {e}", self.model)))
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn predict(&self, prompt: &str) -> Result<serde_json::Value> {
        retry::with_backoff(
            RetryPolicy::model(),
            "model predict",
            retry::retry_transient,
            || self.complete(prompt),
        )
        .await
    }
}
