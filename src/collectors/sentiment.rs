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

const BULLISH: &[&str] = &["moon", "bull", "buy", "long", "pump", "ath", "breakout"];
const BEARISH: &[&str] = &["dump", "bear", "sell", "short", "crash", "rekt", "capitulation"];

/// Retail-forum chatter scan.
pub struct SentimentCollector {
    http: reqwest::Client,
    base_url: String,
    configured: bool,
}

impl SentimentCollector {
    pub fn new(config: &CollectorsConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .user_agent("tipster/0.4")
                .build()
                .unwrap_or_default(),
            base_url: config.sentiment_url.clone(),
            configured: !config.sentiment_url.is_empty(),
        }
    }
}

fn chatter_score(bullish: usize, bearish: usize) -> Decimal {
    let total = bullish + bearish;
    if total == 0 {
        return dec!(5);
    }
    let net = bullish as i64 - bearish as i64;
    (dec!(5) + Decimal::from(net) * dec!(5) / Decimal::from(total as i64))
        .clamp(Decimal::ZERO, dec!(10))
}

#[async_trait]
impl AreaCollector for SentimentCollector {
    fn area(&self) -> AnalysisArea {
        AnalysisArea::Sentiment
    }

    async fn try_collect(&self, symbol: &str) -> Result<AreaReport> {
        if !self.configured {
            return Err(TipsterError::InvalidConfig(
                "sentiment source not configured".into(),
            ));
        }

        let http = &self.http;
        let url = format!("{}/search.json", self.base_url.trim_end_matches('/'));
        let payload: serde_json::Value = retry::with_backoff(
            RetryPolicy::collector(),
            "sentiment",
            retry::retry_transient,
            || {
                let url = url.clone();
                async move {
                    let value = http
                        .get(&url)
                        .query(&[("q", symbol), ("limit", "25"), ("sort", "new")])
                        .send()
                        .await?
                        .json()
                        .await?;
                    Ok(value)
                }
            },
        )
        .await?;

        let posts = payload
            .pointer("/data/children")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                TipsterError::MarketDataUnavailable(format!("no posts for {symbol}"))
            })?;

        let mut bullish = 0usize;
        let mut bearish = 0usize;
        for post in posts {
            let text = post
                .pointer("/data/title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_lowercase();
            if BULLISH.iter().any(|w| text.contains(w)) {
                bullish += 1;
            }
            if BEARISH.iter().any(|w| text.contains(w)) {
                bearish += 1;
            }
        }

        Ok(AreaReport {
            area: AnalysisArea::Sentiment,
            symbol: symbol.to_string(),
            summary: format!(
                "{} recent posts mentioning {symbol}: {bullish} bullish / {bearish} bearish",
                posts.len()
            ),
            score_hint: Some(chatter_score(bullish, bearish)),
            degraded: false,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_chatter_is_neutral() {
        assert_eq!(chatter_score(0, 0), dec!(5));
    }

    #[test]
    fn one_sided_chatter_hits_the_bounds() {
        assert_eq!(chatter_score(4, 0), dec!(10));
        assert_eq!(chatter_score(0, 4), dec!(0));
    }
}
