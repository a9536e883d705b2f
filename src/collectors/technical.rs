use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{AreaCollector, AreaReport};
use crate::config::CollectorsConfig;
use crate::domain::AnalysisArea;
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};

/// RSI + quote snapshot from the technical-indicator API.
pub struct TechnicalCollector {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TechnicalCollector {
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

    async fn fetch(&self, function: &str, symbol: &str) -> Result<serde_json::Value> {
        let http = &self.http;
        let url = &self.base_url;
        retry::with_backoff(
            RetryPolicy::collector(),
            "technical",
            retry::retry_transient,
            || async move {
                let value: serde_json::Value = http
                    .get(url)
                    .query(&[
                        ("function", function),
                        ("symbol", symbol),
                        ("interval", "daily"),
                        ("time_period", "14"),
                        ("series_type", "close"),
                        ("apikey", self.api_key.as_str()),
                    ])
                    .send()
                    .await?
                    .json()
                    .await?;
                Ok(value)
            },
        )
        .await
    }
}

fn rsi_score(rsi: Decimal) -> Decimal {
    // oversold leans bullish, overbought bearish; neutral band maps near 5
    if rsi < dec!(30) {
        dec!(8)
    } else if rsi > dec!(70) {
        dec!(2)
    } else {
        dec!(5)
    }
}

#[async_trait]
impl AreaCollector for TechnicalCollector {
    fn area(&self) -> AnalysisArea {
        AnalysisArea::Technical
    }

    async fn try_collect(&self, symbol: &str) -> Result<AreaReport> {
        if self.api_key.is_empty() {
            return Err(TipsterError::InvalidConfig(
                "technical collector key not configured".into(),
            ));
        }

        let rsi_payload = self.fetch("RSI", symbol).await?;
        let series = rsi_payload
            .get("Technical Analysis: RSI")
            .and_then(|v| v.as_object())
            .ok_or_else(|| {
                TipsterError::MarketDataUnavailable(format!("no RSI series for {symbol}"))
            })?;

        let (date, rsi) = series
            .iter()
            .next()
            .and_then(|(date, row)| {
                row.get("RSI")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<Decimal>().ok())
                    .map(|rsi| (date.clone(), rsi))
            })
            .ok_or_else(|| {
                TipsterError::MarketDataUnavailable(format!("empty RSI series for {symbol}"))
            })?;

        let signal = if rsi > dec!(70) {
            "overbought"
        } else if rsi < dec!(30) {
            "oversold"
        } else {
            "neutral"
        };

        Ok(AreaReport {
            area: AnalysisArea::Technical,
            symbol: symbol.to_string(),
            summary: format!("RSI(14) {rsi:.1} as of {date}: {signal}"),
            score_hint: Some(rsi_score(rsi)),
            degraded: false,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_bands_map_to_scores() {
        assert_eq!(rsi_score(dec!(25)), dec!(8));
        assert_eq!(rsi_score(dec!(50)), dec!(5));
        assert_eq!(rsi_score(dec!(75)), dec!(2));
    }
}
