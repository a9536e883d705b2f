//! Model-provider clients.
//!
//! Each firm's model exposes the same contract: a prompt in, a JSON decision
//! blob out. Four of the five providers speak the OpenAI-compatible chat
//! API at different base URLs; Gemini has its own shape. All clients back
//! off on rate limits and never let provider-specific response shapes leak
//! past this module.

mod gemini;
mod openai_compat;

pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatClient;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ModelsConfig;
use crate::domain::Firm;
use crate::error::{Result, TipsterError};

#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model_id(&self) -> &str;

    /// Returns the raw decision blob. Schema enforcement is the validator's
    /// job, not the client's.
    async fn predict(&self, prompt: &str) -> Result<serde_json::Value>;
}

/// Firm name -> model client.
pub struct ModelRoster {
    clients: HashMap<String, Arc<dyn ModelClient>>,
}

impl ModelRoster {
    /// Build clients for every firm with usable credentials. A firm without
    /// a key stays out of the roster; its pairs skip at cycle time while the
    /// health endpoint reports the missing flag.
    pub fn from_config(firms: &[Firm], config: &ModelsConfig) -> Result<Self> {
        let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
        for firm in firms {
            match build_client(firm, config) {
                Ok(client) => {
                    clients.insert(firm.name.clone(), client);
                }
                Err(err) => warn!("model client for {} unavailable: {}", firm.name, err),
            }
        }
        Ok(Self { clients })
    }

    pub fn with_clients(clients: HashMap<String, Arc<dyn ModelClient>>) -> Self {
        Self { clients }
    }

    pub fn get(&self, firm: &str) -> Result<Arc<dyn ModelClient>> {
        self.clients
            .get(firm)
            .cloned()
            .ok_or_else(|| TipsterError::Internal(format!("no model client for firm {firm}")))
    }
}

fn build_client(firm: &Firm, config: &ModelsConfig) -> Result<Arc<dyn ModelClient>> {
    let firm_config = config.for_firm(&firm.name).ok_or_else(|| {
        TipsterError::InvalidConfig(format!("no model credentials for firm {}", firm.name))
    })?;

    Ok(match firm.name.as_str() {
        "Gemini" => Arc::new(GeminiClient::new(&firm.model_id, &firm_config)?),
        _ => Arc::new(OpenAiCompatClient::new(&firm.model_id, &firm_config)?),
    })
}

/// Default chat endpoints per firm, used when configuration leaves the base
/// URL empty.
pub fn default_base_url(firm: &str) -> &'static str {
    match firm {
        "ChatGPT" => "https://api.openai.com/v1",
        "Gemini" => "https://generativelanguage.googleapis.com",
        "Qwen" => "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
        "Deepseek" => "https://api.deepseek.com",
        "Grok" => "https://api.x.ai/v1",
        _ => "https://api.openai.com/v1",
    }
}

pub(crate) fn rate_limited(status: reqwest::StatusCode, body: &str) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || body.contains("RATELIMIT_EXCEEDED")
        || body.to_lowercase().contains("rate limit")
}
