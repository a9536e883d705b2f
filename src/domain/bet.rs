use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Result, TipsterError};

/// Order side. The engine only ever buys outcome tokens; exits happen through
/// resolution or cancellation, never through selling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetSide {
    Buy,
}

impl BetSide {
    pub fn as_str(&self) -> &'static str {
        "BUY"
    }
}

/// Which outcome token the bet holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketSide {
    Yes,
    No,
}

impl MarketSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl FromStr for MarketSide {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => Ok(Self::Yes),
            "NO" => Ok(Self::No),
            _ => Err("invalid market side"),
        }
    }
}

/// Bet lifecycle. A row is committed as Approved before any submission
/// attempt; everything after that is a recorded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetStatus {
    Approved,
    Submitted,
    Filled,
    Failed,
    Cancelled,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Submitted => "SUBMITTED",
            Self::Filled => "FILLED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Failed | Self::Cancelled)
    }

    /// Allowed transitions: APPROVED -> SUBMITTED | FAILED,
    /// SUBMITTED -> FILLED | FAILED | CANCELLED. Terminal states are final.
    pub fn can_transition_to(&self, to: BetStatus) -> bool {
        matches!(
            (self, to),
            (Self::Approved, Self::Submitted)
                | (Self::Approved, Self::Failed)
                | (Self::Submitted, Self::Filled)
                | (Self::Submitted, Self::Failed)
                | (Self::Submitted, Self::Cancelled)
        )
    }

    pub fn assert_transition(&self, to: BetStatus) -> Result<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(TipsterError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BetStatus {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => Ok(Self::Approved),
            "SUBMITTED" => Ok(Self::Submitted),
            "FILLED" => Ok(Self::Filled),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err("unknown bet status"),
        }
    }
}

/// One executed order intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: Option<i64>,
    pub prediction_id: i64,
    pub firm: String,
    pub market_id: i64,
    pub token_id: String,
    pub side: BetSide,
    pub market_side: MarketSide,
    /// Stake in quote currency, 2-dp.
    pub size: Decimal,
    /// Limit price in (0, 1), 3-dp.
    pub limit_price: Decimal,
    pub status: BetStatus,
    pub order_id: Option<String>,
    pub client_order_id: String,
    pub expected_value: Decimal,
    pub submitted_at: Option<DateTime<Utc>>,
    pub actual_result: Option<bool>,
    pub profit_loss: Option<Decimal>,
    pub error: Option<String>,
    /// Consecutive monitor strikes; resets to zero on any clean review.
    pub consecutive_strikes: i64,
    pub created_at: DateTime<Utc>,
}

impl Bet {
    #[allow(clippy::too_many_arguments)]
    pub fn approved(
        prediction_id: i64,
        firm: &str,
        market_id: i64,
        token_id: &str,
        market_side: MarketSide,
        size: Decimal,
        limit_price: Decimal,
        expected_value: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            prediction_id,
            firm: firm.to_string(),
            market_id,
            token_id: token_id.to_string(),
            side: BetSide::Buy,
            market_side,
            size,
            limit_price,
            status: BetStatus::Approved,
            order_id: None,
            client_order_id: Uuid::new_v4().to_string(),
            expected_value,
            submitted_at: None,
            actual_result: None,
            profit_loss: None,
            error: None,
            consecutive_strikes: 0,
            created_at: now,
        }
    }

    /// Still waiting on the venue: submitted and unresolved.
    pub fn is_open(&self) -> bool {
        self.status == BetStatus::Submitted && self.actual_result.is_none()
    }
}

/// One monitor review of an open order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReview {
    pub timestamp: DateTime<Utc>,
    /// |current - submission| / submission, as a fraction.
    pub price_delta_pct: Decimal,
    pub age_hours: i64,
    pub ai_contradicts: bool,
    pub strike_issued: bool,
}

/// Cancelled order record carrying the full review trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledOrder {
    pub order_id: String,
    pub firm: String,
    pub market_id: i64,
    pub strikes_history: Vec<OrderReview>,
    pub cancel_reason: String,
    pub cancelled_at: DateTime<Utc>,
}
