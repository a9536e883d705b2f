//! Venue signed-order API surface.
//!
//! The venue wraps every response in an `(errno, errmsg, result)` envelope.
//! `errno == 0` is the only success signal; absence of a transport error
//! means nothing. Non-zero errnos are decoded into the error taxonomy here
//! so no caller ever retries a business rejection.

mod client;

pub use client::VenueRestClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::BetSide;
use crate::error::{Result, TipsterError};

/// Listing-endpoint market summary. Token IDs are absent here; the detail
/// endpoint must be hit per market to obtain them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market_id: i64,
    pub title: String,
    pub category: String,
    pub status: String,
    pub volume: Decimal,
}

/// Full market detail, including the two outcome token IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDetail {
    pub market_id: i64,
    pub title: String,
    pub category: String,
    pub status: String,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    /// Set once the market resolves.
    pub winner_token_id: Option<String>,
    pub resolution_time: Option<DateTime<Utc>>,
}

/// Top-of-book snapshot for one outcome token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Orderbook {
    pub ask: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub spread: Option<Decimal>,
}

impl Orderbook {
    pub fn has_liquidity(&self) -> bool {
        self.ask.is_some() || self.bid.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderRequest {
    pub market_id: i64,
    pub token_id: String,
    pub side: BetSide,
    /// Decimal string, <= 3 decimals, strictly inside (0, 1).
    pub price: Decimal,
    /// Quote units, <= 2 decimals.
    pub amount: Decimal,
    pub check_approval: bool,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueTrade {
    pub order_id: String,
    pub market_id: i64,
    pub price: Decimal,
    pub amount: Decimal,
    pub traded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenuePosition {
    pub market_id: i64,
    pub token_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BalanceSnapshot {
    pub total: Decimal,
    pub available: Decimal,
}

/// Outcome of an on-chain redemption request. Redemption needs native-token
/// gas; a persistently low gas balance defers rather than fails.
#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    Submitted { tx_hash: Option<String> },
    DeferredLowGas,
}

/// Contract to the venue's signed-order API. All methods are idempotent or
/// safely repeatable except `place_order`, which callers must persist intent
/// for before invoking.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// One-shot at process start; must succeed before any order flow.
    async fn enable_trading(&self) -> Result<()>;

    async fn get_markets(&self, limit: u32, offset: u32) -> Result<Vec<MarketSummary>>;

    async fn get_market(&self, market_id: i64) -> Result<Option<MarketDetail>>;

    async fn get_orderbook(&self, token_id: &str) -> Result<Orderbook>;

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<PlacedOrder>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn redeem(&self, market_id: i64) -> Result<RedeemOutcome>;

    async fn get_my_trades(&self, limit: u32) -> Result<Vec<VenueTrade>>;

    async fn get_my_positions(&self, limit: u32) -> Result<Vec<VenuePosition>>;

    async fn get_my_balances(&self) -> Result<BalanceSnapshot>;
}

/// Venue error codes worth naming.
pub mod errno {
    /// Authentication/config failure; fatal.
    pub const AUTH: i64 = 10001;
    /// Insufficient quote balance for the order.
    pub const INSUFFICIENT_BALANCE: i64 = 10004;
    /// Geographic block ("Invalid area"). Retrying is pointless.
    pub const INVALID_AREA: i64 = 10403;
    /// Price violates the venue's 3-decimal constraint; a caller bug.
    pub const PRICE_DECIMALS: i64 = 10602;
    /// Upstream gateway hiccup; transient.
    pub const GATEWAY_BUSY: i64 = 10504;
}

/// Decode a non-zero venue errno into the engine's error taxonomy.
pub fn decode_errno(code: i64, message: &str) -> TipsterError {
    match code {
        errno::AUTH => TipsterError::InvalidConfig(format!("venue auth rejected ({code}): {message}")),
        errno::GATEWAY_BUSY => TipsterError::Transient(format!("venue busy ({code}): {message}")),
        _ => TipsterError::Venue {
            errno: code,
            message: message.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errno_is_fatal_config() {
        assert!(decode_errno(errno::AUTH, "bad key").is_fatal_config());
    }

    #[test]
    fn gateway_errno_is_transient() {
        assert!(decode_errno(errno::GATEWAY_BUSY, "try later").is_retryable());
    }

    #[test]
    fn business_errnos_are_not_retryable() {
        for code in [errno::INVALID_AREA, errno::PRICE_DECIMALS, errno::INSUFFICIENT_BALANCE] {
            let err = decode_errno(code, "rejected");
            assert!(!err.is_retryable(), "errno {code} must not retry");
            match err {
                TipsterError::Venue { errno, .. } => assert_eq!(errno, code),
                other => panic!("unexpected error kind: {other}"),
            }
        }
    }

    #[test]
    fn empty_book_has_no_liquidity() {
        assert!(!Orderbook::default().has_liquidity());
    }
}
