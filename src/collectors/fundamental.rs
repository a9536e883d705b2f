use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{AreaCollector, AreaReport};
use crate::config::CollectorsConfig;
use crate::domain::AnalysisArea;
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};

/// Company/asset overview: valuation and profitability basics.
pub struct FundamentalCollector {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FundamentalCollector {
    pub fn new(config: &CollectorsConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.alpha_vantage_url.clone(),
            api_key: config.alpha_vantage_key.clone(),
        }
    }
}

fn field<'a>(payload: &'a serde_json::Value, key: &str) -> &'a str {
    payload.get(key).and_then(|v| v.as_str()).unwrap_or("N/A")
}

#[async_trait]
impl AreaCollector for FundamentalCollector {
    fn area(&self) -> AnalysisArea {
        AnalysisArea::Fundamental
    }

    async fn try_collect(&self, symbol: &str) -> Result<AreaReport> {
        if self.api_key.is_empty() {
            return Err(TipsterError::InvalidConfig(
                "fundamental collector key not configured".into(),
            ));
        }

        let http = &self.http;
        let url = &self.base_url;
        let payload: serde_json::Value = retry::with_backoff(
            RetryPolicy::collector(),
            "fundamental",
            retry::retry_transient,
            || async move {
                let value = http
                    .get(url)
                    .query(&[
                        ("function", "OVERVIEW"),
                        ("symbol", symbol),
                        ("apikey", self.api_key.as_str()),
                    ])
                    .send()
                    .await?
                    .json()
                    .await?;
                Ok(value)
            },
        )
        .await?;

        let name = payload.get("Name").and_then(|v| v.as_str());
        if name.is_none() {
            return Err(TipsterError::MarketDataUnavailable(format!(
                "no fundamental overview for {symbol}"
            )));
        }

        Ok(AreaReport {
            area: AnalysisArea::Fundamental,
            symbol: symbol.to_string(),
            summary: format!(
                "{} ({}) — market cap {}, P/E {}, forward P/E {}, profit margin {}",
                name.unwrap_or(symbol),
                field(&payload, "Sector"),
                field(&payload, "MarketCapitalization"),
                field(&payload, "PERatio"),
                field(&payload, "ForwardPE"),
                field(&payload, "ProfitMargin"),
            ),
            score_hint: None,
            degraded: false,
            generated_at: Utc::now(),
        })
    }
}
