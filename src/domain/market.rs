use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Venue market category. Sports is excluded from trading by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketCategory {
    Crypto,
    Rates,
    Commodities,
    Inflation,
    Employment,
    Finance,
    Politics,
    Tech,
    Sports,
    Other,
}

impl MarketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "Crypto",
            Self::Rates => "Rates",
            Self::Commodities => "Commodities",
            Self::Inflation => "Inflation",
            Self::Employment => "Employment",
            Self::Finance => "Finance",
            Self::Politics => "Politics",
            Self::Tech => "Tech",
            Self::Sports => "Sports",
            Self::Other => "Other",
        }
    }

    /// The venue sends categories as free text; unknown labels fold to Other.
    pub fn parse_loose(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "crypto" | "cryptocurrency" => Self::Crypto,
            "rates" | "interest rates" => Self::Rates,
            "commodities" => Self::Commodities,
            "inflation" => Self::Inflation,
            "employment" | "jobs" => Self::Employment,
            "finance" | "stocks" | "equities" => Self::Finance,
            "politics" => Self::Politics,
            "tech" | "technology" => Self::Tech,
            "sports" | "sport" => Self::Sports,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Venue market lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Activated,
    Resolved,
    Closed,
    Cancelled,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activated => "ACTIVATED",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// The venue serializes status either as an enum tag ("TopicStatus.ACTIVATED"),
    /// a bare name, or a numeric code. Extract the human name and match on it.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let name = raw.rsplit('.').next().unwrap_or(raw).trim();
        match name.to_ascii_uppercase().as_str() {
            "ACTIVATED" | "ACTIVE" | "2" => Some(Self::Activated),
            "RESOLVED" | "5" => Some(Self::Resolved),
            "CLOSED" | "3" => Some(Self::Closed),
            "CANCELLED" | "CANCELED" | "4" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MarketStatus {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_raw(raw).ok_or("unknown market status")
    }
}

/// Why a listed market was rejected as untradable. Tags are logged and
/// persisted verbatim as skip rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradabilityReject {
    Resolved,
    Closed,
    Cancelled,
    NoYesTokenId,
    NoNoTokenId,
    SportsCategory,
    NoLiquidity,
}

impl TradabilityReject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::NoYesTokenId => "no_yes_token_id",
            Self::NoNoTokenId => "no_no_token_id",
            Self::SportsCategory => "sports_category",
            Self::NoLiquidity => "no_liquidity",
        }
    }
}

impl std::fmt::Display for TradabilityReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalised binary market snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub market_id: i64,
    pub title: String,
    pub category: MarketCategory,
    pub status: MarketStatus,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub ask_price: Option<Decimal>,
    pub bid_price: Option<Decimal>,
    pub volume: Decimal,
    pub resolution_time: Option<DateTime<Utc>>,
    pub has_liquidity: bool,
}

impl Market {
    /// Tradability invariant. Token existence is checked before liquidity so
    /// callers can skip the per-market orderbook fetch for tokenless markets.
    pub fn check_tradable(&self) -> std::result::Result<(), TradabilityReject> {
        match self.status {
            MarketStatus::Activated => {}
            MarketStatus::Resolved => return Err(TradabilityReject::Resolved),
            MarketStatus::Closed => return Err(TradabilityReject::Closed),
            MarketStatus::Cancelled => return Err(TradabilityReject::Cancelled),
        }
        if self.yes_token_id.as_deref().unwrap_or("").is_empty() {
            return Err(TradabilityReject::NoYesTokenId);
        }
        if self.no_token_id.as_deref().unwrap_or("").is_empty() {
            return Err(TradabilityReject::NoNoTokenId);
        }
        if self.category == MarketCategory::Sports {
            return Err(TradabilityReject::SportsCategory);
        }
        if !self.has_liquidity {
            return Err(TradabilityReject::NoLiquidity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            market_id: 7,
            title: "Will BTC close above 100k this month?".into(),
            category: MarketCategory::Crypto,
            status: MarketStatus::Activated,
            yes_token_id: Some("T1".into()),
            no_token_id: Some("T2".into()),
            ask_price: Some(dec!(0.40)),
            bid_price: Some(dec!(0.38)),
            volume: dec!(1250.00),
            resolution_time: None,
            has_liquidity: true,
        }
    }

    #[test]
    fn tradable_market_passes() {
        assert!(market().check_tradable().is_ok());
    }

    #[test]
    fn token_checks_precede_category_and_liquidity() {
        let mut m = market();
        m.yes_token_id = None;
        m.category = MarketCategory::Sports;
        m.has_liquidity = false;
        assert_eq!(m.check_tradable(), Err(TradabilityReject::NoYesTokenId));

        m.yes_token_id = Some("T1".into());
        m.no_token_id = Some(String::new());
        assert_eq!(m.check_tradable(), Err(TradabilityReject::NoNoTokenId));
    }

    #[test]
    fn sports_markets_are_rejected() {
        let mut m = market();
        m.category = MarketCategory::Sports;
        assert_eq!(m.check_tradable(), Err(TradabilityReject::SportsCategory));
    }

    #[test]
    fn status_parses_from_enum_tag_or_name() {
        assert_eq!(
            MarketStatus::from_raw("TopicStatus.ACTIVATED"),
            Some(MarketStatus::Activated)
        );
        assert_eq!(MarketStatus::from_raw("resolved"), Some(MarketStatus::Resolved));
        assert_eq!(MarketStatus::from_raw("2"), Some(MarketStatus::Activated));
        assert_eq!(MarketStatus::from_raw("???"), None);
    }

    #[test]
    fn unknown_categories_fold_to_other() {
        assert_eq!(MarketCategory::parse_loose("Weather"), MarketCategory::Other);
        assert_eq!(MarketCategory::parse_loose("CRYPTO"), MarketCategory::Crypto);
    }
}
