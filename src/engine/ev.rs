//! Side selection, entry-price resolution, and expected value net of fees.
//!
//! Fees are charged only on payout at win time, not on the buy. For stake
//! `s` at price `c` with win probability `p` and fee `f`:
//!
//! ```text
//! gross_ev = p * (s/c - s) - (1 - p) * s
//! fee_cost = p * (s/c) * f
//! net_ev   = gross_ev - fee_cost
//! ```
//!
//! Both are linear in `s`, so sign and side comparisons use the unit EV.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::domain::{Market, MarketSide};
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};
use crate::venue::{Orderbook, VenueClient};

/// YES wins ties: deterministic for p exactly 0.5.
pub fn choose_side(probability: Decimal) -> MarketSide {
    if probability >= dec!(0.5) {
        MarketSide::Yes
    } else {
        MarketSide::No
    }
}

/// Probability that the chosen side wins.
pub fn side_probability(probability: Decimal, side: MarketSide) -> Decimal {
    match side {
        MarketSide::Yes => probability,
        MarketSide::No => Decimal::ONE - probability,
    }
}

/// Net expected value per unit stake at buy price `price`.
pub fn unit_net_ev(win_probability: Decimal, price: Decimal, fee_rate: Decimal) -> Decimal {
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        return Decimal::MIN;
    }
    let payout = Decimal::ONE / price;
    let gross = win_probability * (payout - Decimal::ONE) - (Decimal::ONE - win_probability);
    let fee_cost = win_probability * payout * fee_rate;
    gross - fee_cost
}

/// Net expected value for a concrete stake.
pub fn net_expected_value(
    win_probability: Decimal,
    price: Decimal,
    size: Decimal,
    fee_rate: Decimal,
) -> Decimal {
    unit_net_ev(win_probability, price, fee_rate) * size
}

/// Venue constraint: exactly 3 decimals, strictly inside (0, 1). Rounding
/// must never land on a boundary.
pub fn clamp_order_price(price: Decimal) -> Decimal {
    price.round_dp(3).clamp(dec!(0.001), dec!(0.999))
}

/// Buy-price fallback chain for a token: ASK, then mid, then BID + spread.
pub fn entry_price_from_book(book: &Orderbook) -> Option<Decimal> {
    if let Some(ask) = book.ask {
        return Some(ask);
    }
    if let Some(mid) = book.mid {
        return Some(mid);
    }
    match (book.bid, book.spread) {
        (Some(bid), Some(spread)) => Some(bid + spread),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct EntrySelection {
    pub side: MarketSide,
    pub token_id: String,
    pub entry_price: Decimal,
    /// Probability of the chosen side winning.
    pub win_probability: Decimal,
    pub unit_ev: Decimal,
}

/// Pick the side per the model probability, overriding only when the
/// market-level quotes show the *other* side also profitable and larger
/// (stale-book case; rare, always logged).
pub fn choose_side_with_quotes(
    probability: Decimal,
    market: &Market,
    fee_rate: Decimal,
) -> MarketSide {
    let preferred = choose_side(probability);
    let (Some(ask), Some(bid)) = (market.ask_price, market.bid_price) else {
        return preferred;
    };
    let no_price = Decimal::ONE - bid;
    let yes_ev = unit_net_ev(probability, ask, fee_rate);
    let no_ev = unit_net_ev(Decimal::ONE - probability, no_price, fee_rate);

    if yes_ev > Decimal::ZERO && no_ev > Decimal::ZERO {
        let better = if yes_ev >= no_ev {
            MarketSide::Yes
        } else {
            MarketSide::No
        };
        warn!(
            market_id = market.market_id,
            %yes_ev,
            %no_ev,
            "both sides positive after fees (stale book?); taking {}",
            better.as_str()
        );
        return better;
    }
    preferred
}

/// Resolve the full entry decision for one (prediction, market) pair:
/// choose the side, fetch its book with bounded retries, and compute EV at
/// the actual entry price.
pub async fn select_entry(
    venue: &dyn VenueClient,
    market: &Market,
    probability: Decimal,
    fee_rate: Decimal,
) -> Result<EntrySelection> {
    let side = choose_side_with_quotes(probability, market, fee_rate);
    let token_id = match side {
        MarketSide::Yes => market.yes_token_id.clone(),
        MarketSide::No => market.no_token_id.clone(),
    }
    .ok_or_else(|| {
        TipsterError::Integrity(format!(
            "market {} passed tradability without a {} token",
            market.market_id,
            side.as_str()
        ))
    })?;

    let book = retry::with_backoff(
        RetryPolicy::venue(),
        "orderbook fetch",
        retry::retry_transient,
        || venue.get_orderbook(&token_id),
    )
    .await?;

    let entry_price = entry_price_from_book(&book).ok_or_else(|| {
        TipsterError::MarketDataUnavailable(format!(
            "no usable price for token {token_id} on market {}",
            market.market_id
        ))
    })?;

    let win_probability = side_probability(probability, side);
    Ok(EntrySelection {
        side,
        token_id,
        entry_price,
        win_probability,
        unit_ev: unit_net_ev(win_probability, entry_price, fee_rate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketCategory, MarketStatus};

    fn market(ask: Option<Decimal>, bid: Option<Decimal>) -> Market {
        Market {
            market_id: 1,
            title: "t".into(),
            category: MarketCategory::Crypto,
            status: MarketStatus::Activated,
            yes_token_id: Some("Y".into()),
            no_token_id: Some("N".into()),
            ask_price: ask,
            bid_price: bid,
            volume: dec!(0),
            resolution_time: None,
            has_liquidity: true,
        }
    }

    #[test]
    fn side_selection_ties_break_to_yes() {
        assert_eq!(choose_side(dec!(0.5)), MarketSide::Yes);
        assert_eq!(choose_side(dec!(0.49)), MarketSide::No);
        assert_eq!(choose_side(dec!(0.51)), MarketSide::Yes);
    }

    #[test]
    fn ev_formula_matches_hand_computation() {
        // p=0.6, c=0.4, s=1.5, f=0.03
        // payout = 3.75; gross = 0.6*2.25 - 0.4*1.5 = 0.75
        // fee = 0.6 * 3.75 * 0.03 = 0.0675; net = 0.6825
        let net = net_expected_value(dec!(0.6), dec!(0.4), dec!(1.5), dec!(0.03));
        assert_eq!(net.round_dp(4), dec!(0.6825));
    }

    #[test]
    fn negative_edge_has_negative_ev() {
        assert!(unit_net_ev(dec!(0.3), dec!(0.5), dec!(0.03)) < Decimal::ZERO);
        // fair price with fees is negative too
        assert!(unit_net_ev(dec!(0.5), dec!(0.5), dec!(0.03)) < Decimal::ZERO);
    }

    #[test]
    fn price_clamps_to_three_decimals_inside_bounds() {
        assert_eq!(clamp_order_price(dec!(0.4)), dec!(0.400));
        assert_eq!(clamp_order_price(dec!(0.12345)), dec!(0.123));
        assert_eq!(clamp_order_price(dec!(0.0001)), dec!(0.001));
        assert_eq!(clamp_order_price(dec!(0.9999)), dec!(0.999));
        assert_eq!(clamp_order_price(dec!(1.2)), dec!(0.999));
    }

    #[test]
    fn entry_price_fallback_chain() {
        let full = Orderbook {
            ask: Some(dec!(0.40)),
            bid: Some(dec!(0.38)),
            mid: Some(dec!(0.39)),
            spread: Some(dec!(0.02)),
        };
        assert_eq!(entry_price_from_book(&full), Some(dec!(0.40)));

        let no_ask = Orderbook {
            ask: None,
            ..full
        };
        assert_eq!(entry_price_from_book(&no_ask), Some(dec!(0.39)));

        let bid_only = Orderbook {
            ask: None,
            mid: None,
            bid: Some(dec!(0.38)),
            spread: Some(dec!(0.02)),
        };
        assert_eq!(entry_price_from_book(&bid_only), Some(dec!(0.40)));

        assert_eq!(entry_price_from_book(&Orderbook::default()), None);
    }

    #[test]
    fn stale_book_prefers_larger_ev_side() {
        // model says NO (p = 0.4) but the book is so cheap on YES that both
        // sides clear the fee; the larger EV side wins
        let m = market(Some(dec!(0.08)), Some(dec!(0.85)));
        let side = choose_side_with_quotes(dec!(0.4), &m, dec!(0.03));
        assert_eq!(side, MarketSide::Yes);

        // normal book: follow the probability
        let m = market(Some(dec!(0.55)), Some(dec!(0.53)));
        assert_eq!(
            choose_side_with_quotes(dec!(0.4), &m, dec!(0.03)),
            MarketSide::No
        );

        // missing quotes: follow the probability
        let m = market(None, None);
        assert_eq!(
            choose_side_with_quotes(dec!(0.7), &m, dec!(0.03)),
            MarketSide::Yes
        );
    }
}
