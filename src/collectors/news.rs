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

const POSITIVE: &[&str] = &["surge", "rally", "beat", "record", "gain", "approval", "growth"];
const NEGATIVE: &[&str] = &["crash", "plunge", "miss", "lawsuit", "ban", "fraud", "selloff"];

/// Recent-headline scan with a crude tone count.
pub struct NewsCollector {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewsCollector {
    pub fn new(config: &CollectorsConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.news_api_url.clone(),
            api_key: config.news_api_key.clone(),
        }
    }
}

fn tone_score(positive: usize, negative: usize) -> Decimal {
    let total = positive + negative;
    if total == 0 {
        return dec!(5);
    }
    // map [-1, 1] net tone onto [0, 10]
    let net = positive as i64 - negative as i64;
    let score = dec!(5) + Decimal::from(net) * dec!(5) / Decimal::from(total as i64);
    score.clamp(Decimal::ZERO, dec!(10))
}

#[async_trait]
impl AreaCollector for NewsCollector {
    fn area(&self) -> AnalysisArea {
        AnalysisArea::News
    }

    async fn try_collect(&self, symbol: &str) -> Result<AreaReport> {
        if self.api_key.is_empty() {
            return Err(TipsterError::InvalidConfig(
                "news collector key not configured".into(),
            ));
        }

        let http = &self.http;
        let url = format!("{}/everything", self.base_url.trim_end_matches('/'));
        let payload: serde_json::Value = retry::with_backoff(
            RetryPolicy::collector(),
            "news",
            retry::retry_transient,
            || {
                let url = url.clone();
                async move {
                    let value = http
                        .get(&url)
                        .query(&[
                            ("q", symbol),
                            ("sortBy", "publishedAt"),
                            ("pageSize", "20"),
                            ("apiKey", self.api_key.as_str()),
                        ])
                        .send()
                        .await?
                        .json()
                        .await?;
                    Ok(value)
                }
            },
        )
        .await?;

        let articles = payload
            .get("articles")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                TipsterError::MarketDataUnavailable(format!("no articles for {symbol}"))
            })?;

        let mut positive = 0usize;
        let mut negative = 0usize;
        let mut headlines = Vec::new();
        for article in articles.iter().take(20) {
            let title = article
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_lowercase();
            if POSITIVE.iter().any(|w| title.contains(w)) {
                positive += 1;
            }
            if NEGATIVE.iter().any(|w| title.contains(w)) {
                negative += 1;
            }
            if headlines.len() < 5 {
                headlines.push(title);
            }
        }

        Ok(AreaReport {
            area: AnalysisArea::News,
            symbol: symbol.to_string(),
            summary: format!(
                "{} recent articles ({} positive / {} negative). Top headlines: {}",
                articles.len(),
                positive,
                negative,
                headlines.join(" | ")
            ),
            score_hint: Some(tone_score(positive, negative)),
            degraded: false,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_tone_is_neutral() {
        assert_eq!(tone_score(0, 0), dec!(5));
        assert_eq!(tone_score(3, 3), dec!(5));
    }

    #[test]
    fn tone_score_stays_in_range() {
        assert_eq!(tone_score(5, 0), dec!(10));
        assert_eq!(tone_score(0, 5), dec!(0));
    }
}
