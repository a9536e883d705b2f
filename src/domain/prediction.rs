use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// The five analytic areas every firm scores per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisArea {
    Sentiment,
    News,
    Technical,
    Fundamental,
    Volatility,
}

impl AnalysisArea {
    pub const ALL: [AnalysisArea; 5] = [
        AnalysisArea::Sentiment,
        AnalysisArea::News,
        AnalysisArea::Technical,
        AnalysisArea::Fundamental,
        AnalysisArea::Volatility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::News => "news",
            Self::Technical => "technical",
            Self::Fundamental => "fundamental",
            Self::Volatility => "volatility",
        }
    }
}

impl std::fmt::Display for AnalysisArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-area numeric scores in [0, 10]. 5 is the neutral default used when a
/// collector or model omits an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaScores {
    pub sentiment: Decimal,
    pub news: Decimal,
    pub technical: Decimal,
    pub fundamental: Decimal,
    pub volatility: Decimal,
}

impl AreaScores {
    pub fn neutral() -> Self {
        let five = dec!(5);
        Self {
            sentiment: five,
            news: five,
            technical: five,
            fundamental: five,
            volatility: five,
        }
    }

    pub fn get(&self, area: AnalysisArea) -> Decimal {
        match area {
            AnalysisArea::Sentiment => self.sentiment,
            AnalysisArea::News => self.news,
            AnalysisArea::Technical => self.technical,
            AnalysisArea::Fundamental => self.fundamental,
            AnalysisArea::Volatility => self.volatility,
        }
    }

    pub fn set(&mut self, area: AnalysisArea, value: Decimal) {
        match area {
            AnalysisArea::Sentiment => self.sentiment = value,
            AnalysisArea::News => self.news = value,
            AnalysisArea::Technical => self.technical = value,
            AnalysisArea::Fundamental => self.fundamental = value,
            AnalysisArea::Volatility => self.volatility = value,
        }
    }

    pub fn all_in_range(&self) -> bool {
        AnalysisArea::ALL
            .iter()
            .all(|a| self.get(*a) >= Decimal::ZERO && self.get(*a) <= dec!(10))
    }
}

/// Per-area free-text analyses. Empty strings are legal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaAnalyses {
    pub sentiment: String,
    pub news: String,
    pub technical: String,
    pub fundamental: String,
    pub volatility: String,
}

impl AreaAnalyses {
    pub fn get(&self, area: AnalysisArea) -> &str {
        match area {
            AnalysisArea::Sentiment => &self.sentiment,
            AnalysisArea::News => &self.news,
            AnalysisArea::Technical => &self.technical,
            AnalysisArea::Fundamental => &self.fundamental,
            AnalysisArea::Volatility => &self.volatility,
        }
    }

    pub fn set(&mut self, area: AnalysisArea, value: String) {
        match area {
            AnalysisArea::Sentiment => self.sentiment = value,
            AnalysisArea::News => self.news = value,
            AnalysisArea::Technical => self.technical = value,
            AnalysisArea::Fundamental => self.fundamental = value,
            AnalysisArea::Volatility => self.volatility = value,
        }
    }
}

/// Canonical prediction record. One row exists for every (firm, event) pair
/// evaluated, whether or not a bet followed; `skip_reason` records why not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Option<i64>,
    pub firm: String,
    pub market_id: i64,
    /// Probability of YES, in [0, 1].
    pub probability: Decimal,
    /// Confidence in [0, 10].
    pub confidence: Decimal,
    pub scores: AreaScores,
    pub analyses: AreaAnalyses,
    pub probability_reasoning: String,
    pub skip_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// Placeholder row for pairs where the model produced no usable decision.
    /// Keeps the "every evaluated event has a prediction" invariant auditable.
    pub fn unusable(firm: &str, market_id: i64, reason: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            firm: firm.to_string(),
            market_id,
            probability: dec!(0.5),
            confidence: Decimal::ZERO,
            scores: AreaScores::neutral(),
            analyses: AreaAnalyses::default(),
            probability_reasoning: String::new(),
            skip_reason: Some(reason.to_string()),
            created_at: now,
        }
    }
}
