//! Market-data collectors for the five analytic areas.
//!
//! Collectors are best-effort: an upstream outage degrades to a neutral
//! report, never to an error. All five firms analyse the same events, so
//! collector output is shared through the per-cycle cache.

mod cache;
mod fundamental;
mod news;
mod sentiment;
mod technical;
mod volatility;

pub use cache::CycleCache;
pub use fundamental::FundamentalCollector;
pub use news::NewsCollector;
pub use sentiment::SentimentCollector;
pub use technical::TechnicalCollector;
pub use volatility::VolatilityCollector;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CollectorsConfig;
use crate::domain::AnalysisArea;
use crate::error::Result;

/// One area's report for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaReport {
    pub area: AnalysisArea,
    pub symbol: String,
    pub summary: String,
    /// Collector's own 0-10 lean, if it has one. Models may weigh or ignore it.
    pub score_hint: Option<Decimal>,
    /// True when the upstream failed and this is a neutral placeholder.
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

impl AreaReport {
    pub fn neutral(area: AnalysisArea, symbol: &str, reason: &str) -> Self {
        Self {
            area,
            symbol: symbol.to_string(),
            summary: format!("{area} data unavailable: {reason}"),
            score_hint: None,
            degraded: true,
            generated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AreaCollector: Send + Sync {
    fn area(&self) -> AnalysisArea;

    async fn try_collect(&self, symbol: &str) -> Result<AreaReport>;

    /// Degrades to neutral instead of failing.
    async fn collect(&self, symbol: &str) -> AreaReport {
        match self.try_collect(symbol).await {
            Ok(report) => report,
            Err(err) => {
                warn!("{} collector failed for {}: {}", self.area(), symbol, err);
                AreaReport::neutral(self.area(), symbol, &err.to_string())
            }
        }
    }
}

/// The five collectors, one per area.
pub struct CollectorSet {
    collectors: Vec<Arc<dyn AreaCollector>>,
}

impl CollectorSet {
    pub fn from_config(config: &CollectorsConfig) -> Self {
        let collectors: Vec<Arc<dyn AreaCollector>> = vec![
            Arc::new(SentimentCollector::new(config)),
            Arc::new(NewsCollector::new(config)),
            Arc::new(TechnicalCollector::new(config)),
            Arc::new(FundamentalCollector::new(config)),
            Arc::new(VolatilityCollector::new(config)),
        ];
        Self { collectors }
    }

    #[cfg(test)]
    pub fn from_collectors(collectors: Vec<Arc<dyn AreaCollector>>) -> Self {
        Self { collectors }
    }

    pub fn get(&self, area: AnalysisArea) -> Option<Arc<dyn AreaCollector>> {
        self.collectors.iter().find(|c| c.area() == area).cloned()
    }
}

/// Symbols the venue's event titles commonly reference. Events with no
/// recognisable ticker share the GENERAL bucket so cache hits still apply.
const KNOWN_SYMBOLS: &[&str] = &[
    "BTC", "ETH", "SOL", "BNB", "DOGE", "XRP", "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META",
    "NVDA",
];

pub const GENERAL_SYMBOL: &str = "GENERAL";

/// Best-effort ticker extraction from a market title.
pub fn extract_symbol(title: &str) -> String {
    let upper = title.to_uppercase();
    for symbol in KNOWN_SYMBOLS {
        let found = upper
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == *symbol);
        if found {
            return (*symbol).to_string();
        }
    }
    GENERAL_SYMBOL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_ticker_from_title() {
        assert_eq!(extract_symbol("Will BTC close above $100k?"), "BTC");
        assert_eq!(extract_symbol("TSLA delivery beat this quarter"), "TSLA");
    }

    #[test]
    fn unknown_titles_share_the_general_bucket() {
        assert_eq!(extract_symbol("Will the Fed cut rates in June?"), "GENERAL");
        // substring matches must not fire
        assert_eq!(extract_symbol("METAL prices spike"), "GENERAL");
    }

    #[test]
    fn neutral_report_is_flagged_degraded() {
        let report = AreaReport::neutral(AnalysisArea::News, "BTC", "upstream 503");
        assert!(report.degraded);
        assert!(report.summary.contains("news"));
        assert!(report.score_hint.is_none());
    }
}
