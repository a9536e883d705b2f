//! Prompt assembly for one (firm, market) pair.
//!
//! Gathers the five area reports (shared through the per-cycle cache),
//! prefixes the firm's persona, and produces the structured prompt with a
//! strict JSON output contract. The model sees collector degradation
//! explicitly so it can discount missing areas.

use std::sync::Arc;

use crate::collectors::{extract_symbol, AreaReport, CollectorSet, CycleCache};
use crate::domain::{AnalysisArea, Firm, Market};

pub struct AssembledInput {
    pub symbol: String,
    pub reports: Vec<AreaReport>,
    pub prompt: String,
}

pub struct AnalysisAssembler {
    collectors: Arc<CollectorSet>,
    cache: Arc<CycleCache>,
}

impl AnalysisAssembler {
    pub fn new(collectors: Arc<CollectorSet>, cache: Arc<CycleCache>) -> Self {
        Self { collectors, cache }
    }

    pub async fn assemble(&self, firm: &Firm, market: &Market) -> AssembledInput {
        let symbol = extract_symbol(&market.title);

        let mut reports = Vec::with_capacity(AnalysisArea::ALL.len());
        for area in AnalysisArea::ALL {
            let report = match self.collectors.get(area) {
                Some(collector) => {
                    self.cache
                        .get_or_load(&symbol, area, || {
                            let collector = collector.clone();
                            let symbol = symbol.clone();
                            async move { collector.collect(&symbol).await }
                        })
                        .await
                }
                None => AreaReport::neutral(area, &symbol, "collector not registered"),
            };
            reports.push(report);
        }

        let prompt = build_prompt(firm, market, &reports);
        AssembledInput {
            symbol,
            reports,
            prompt,
        }
    }
}

pub fn build_prompt(firm: &Firm, market: &Market, reports: &[AreaReport]) -> String {
    let mut sections = String::new();
    for report in reports {
        let header = report.area.as_str().to_uppercase();
        let hint = match report.score_hint {
            Some(hint) => format!(" (collector lean: {hint}/10)"),
            None => String::new(),
        };
        sections.push_str(&format!(
            "=== {header} REPORT{hint} ===\n{}\n\n",
            report.summary
        ));
    }

    format!(
        r#"You are the executive intelligence running the autonomous trading firm "{firm_name}".
Your mission is to produce a calibrated, risk-adjusted probability for a binary
prediction market, maximizing your firm's long-run risk-adjusted return.

Target event: {title}
Category: {category}

You have five consolidated input reports:

{sections}Run a three-stage internal process:

STAGE I — Synthesis (analyst team): condense the strongest signals from the
reports into at most 150 words, naming the three factors that most push the
event toward YES or NO.

STAGE II — Debate (research team and trader): argue the strongest bull case
(the event resolves YES) and the strongest bear case (it resolves NO), then
settle on a preliminary direction and a confidence level from 0 to 10.

STAGE III — Risk adjustment (fund manager): consider the drawdown if you are
wrong. With confidence below 5, pull the probability toward 0.50; with high
confidence, let it approach 0 or 1. Produce the final probability.

Respond with ONLY a valid JSON object in exactly this shape:

{{
    "probability": <number between 0.0 and 1.0, probability the event resolves YES>,
    "confidence": <number between 0 and 10>,
    "sentiment_score": <number 0-10>,
    "news_score": <number 0-10>,
    "technical_score": <number 0-10>,
    "fundamental_score": <number 0-10>,
    "volatility_score": <number 0-10>,
    "sentiment_analysis": "<short text>",
    "news_analysis": "<short text>",
    "technical_analysis": "<short text>",
    "fundamental_analysis": "<short text>",
    "volatility_analysis": "<short text>",
    "probability_reasoning": "<the stage III justification>"
}}

No text before or after the JSON."#,
        firm_name = firm.name,
        title = market.title,
        category = market.category,
        sections = sections,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketCategory, MarketStatus, SizingStrategy};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            market_id: 5,
            title: "Will BTC close above $100k this month?".into(),
            category: MarketCategory::Crypto,
            status: MarketStatus::Activated,
            yes_token_id: Some("T1".into()),
            no_token_id: Some("T2".into()),
            ask_price: Some(dec!(0.40)),
            bid_price: Some(dec!(0.38)),
            volume: dec!(100),
            resolution_time: None,
            has_liquidity: true,
        }
    }

    #[test]
    fn prompt_names_the_firm_and_lists_all_areas() {
        let firm = Firm::new("Grok", "grok-2-1212", "#06B6D4", SizingStrategy::AntiMartingale);
        let reports: Vec<AreaReport> = AnalysisArea::ALL
            .iter()
            .map(|area| AreaReport {
                area: *area,
                symbol: "BTC".into(),
                summary: format!("{area} summary"),
                score_hint: None,
                degraded: false,
                generated_at: Utc::now(),
            })
            .collect();

        let prompt = build_prompt(&firm, &market(), &reports);
        assert!(prompt.contains("\"Grok\""));
        assert!(prompt.contains("SENTIMENT REPORT"));
        assert!(prompt.contains("VOLATILITY REPORT"));
        assert!(prompt.contains("\"probability_reasoning\""));
        assert!(prompt.contains(&market().title));
    }
}
