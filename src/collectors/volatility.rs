use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{AreaCollector, AreaReport};
use crate::config::CollectorsConfig;
use crate::domain::AnalysisArea;
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};

/// Realized volatility over the recent daily closes.
pub struct VolatilityCollector {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VolatilityCollector {
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

/// Sample standard deviation of daily log-ish returns, in percent.
fn daily_return_stddev(closes: &[f64]) -> Option<f64> {
    if closes.len() < 3 {
        return None;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[1] != 0.0)
        .map(|w| (w[0] - w[1]) / w[1] * 100.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Higher realized volatility means a wider outcome distribution; score it
/// toward 10 so models treat the event as harder to call.
fn volatility_score(stddev_pct: f64) -> Decimal {
    let score = (stddev_pct * 2.0).clamp(0.0, 10.0);
    Decimal::from_f64(score).unwrap_or(dec!(5)).round_dp(1)
}

#[async_trait]
impl AreaCollector for VolatilityCollector {
    fn area(&self) -> AnalysisArea {
        AnalysisArea::Volatility
    }

    async fn try_collect(&self, symbol: &str) -> Result<AreaReport> {
        if self.api_key.is_empty() {
            return Err(TipsterError::InvalidConfig(
                "volatility collector key not configured".into(),
            ));
        }

        let http = &self.http;
        let url = &self.base_url;
        let payload: serde_json::Value = retry::with_backoff(
            RetryPolicy::collector(),
            "volatility",
            retry::retry_transient,
            || async move {
                let value = http
                    .get(url)
                    .query(&[
                        ("function", "TIME_SERIES_DAILY"),
                        ("symbol", symbol),
                        ("outputsize", "compact"),
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

        let series = payload
            .get("Time Series (Daily)")
            .and_then(|v| v.as_object())
            .ok_or_else(|| {
                TipsterError::MarketDataUnavailable(format!("no daily series for {symbol}"))
            })?;

        // the API returns newest-first keys; take a month of closes
        let closes: Vec<f64> = series
            .values()
            .take(22)
            .filter_map(|row| {
                row.get("4. close")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<f64>().ok())
            })
            .collect();

        let stddev = daily_return_stddev(&closes).ok_or_else(|| {
            TipsterError::MarketDataUnavailable(format!("not enough closes for {symbol}"))
        })?;

        Ok(AreaReport {
            area: AnalysisArea::Volatility,
            symbol: symbol.to_string(),
            summary: format!(
                "Realized daily volatility over {} sessions: {:.2}% stddev of returns",
                closes.len(),
                stddev
            ),
            score_hint: Some(volatility_score(stddev)),
            degraded: false,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stddev_of_flat_series_is_zero() {
        let closes = vec![100.0, 100.0, 100.0, 100.0];
        assert_eq!(daily_return_stddev(&closes), Some(0.0));
    }

    #[test]
    fn short_series_yields_none() {
        assert_eq!(daily_return_stddev(&[100.0, 101.0]), None);
    }

    #[test]
    fn score_is_bounded() {
        assert_eq!(volatility_score(0.0), dec!(0));
        assert_eq!(volatility_score(100.0), dec!(10));
    }
}
