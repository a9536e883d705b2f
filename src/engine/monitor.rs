//! Order monitoring: the 3-strike rule.
//!
//! A periodic pass reviews every SUBMITTED, unresolved bet against three
//! factors: price manipulation (>15% move from submission price), stagnation
//! (open longer than a week), and AI contradiction (a fresh re-evaluation by
//! the same firm landing on the other side of 0.5). Any tripped factor is a
//! strike; a clean review resets the counter — strikes must be consecutive.
//! The third consecutive strike cancels the order at the venue and archives
//! the full review trail.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

use crate::analysis::{validate_decision, AnalysisAssembler};
use crate::config::MonitorConfig;
use crate::domain::{
    Bet, CancelledOrder, Market, MarketCategory, MarketSide, MarketStatus, OrderReview,
};
use crate::error::Result;
use crate::models::ModelRoster;
use crate::store::Store;
use crate::venue::VenueClient;

use super::ev::entry_price_from_book;

/// Fresh per-firm probability for an event, used for the AI-contradiction
/// factor. Separated behind a trait so monitor logic tests without models.
#[async_trait]
pub trait ProbabilityReviser: Send + Sync {
    async fn revise(&self, firm: &str, market_id: i64) -> Result<Decimal>;
}

/// Production reviser: rebuilds the prompt and asks the firm's own model.
pub struct FirmReviser {
    pub venue: Arc<dyn VenueClient>,
    pub assembler: Arc<AnalysisAssembler>,
    pub models: Arc<ModelRoster>,
    pub firms: Vec<crate::domain::Firm>,
}

#[async_trait]
impl ProbabilityReviser for FirmReviser {
    async fn revise(&self, firm_name: &str, market_id: i64) -> Result<Decimal> {
        let firm = self
            .firms
            .iter()
            .find(|f| f.name == firm_name)
            .ok_or_else(|| {
                crate::error::TipsterError::Internal(format!("unknown firm {firm_name}"))
            })?;

        let detail = self.venue.get_market(market_id).await?.ok_or_else(|| {
            crate::error::TipsterError::MarketDataUnavailable(format!(
                "market {market_id} vanished"
            ))
        })?;

        let market = Market {
            market_id: detail.market_id,
            title: detail.title,
            category: MarketCategory::parse_loose(&detail.category),
            status: MarketStatus::from_raw(&detail.status).unwrap_or(MarketStatus::Activated),
            yes_token_id: detail.yes_token_id,
            no_token_id: detail.no_token_id,
            ask_price: None,
            bid_price: None,
            volume: Decimal::ZERO,
            resolution_time: detail.resolution_time,
            has_liquidity: true,
        };

        let input = self.assembler.assemble(firm, &market).await;
        let blob = self.models.get(&firm.name)?.predict(&input.prompt).await?;
        let prediction = validate_decision(&firm.name, market_id, &blob, Utc::now())?;
        Ok(prediction.probability)
    }
}

/// Evaluate one review. Pure: all inputs are explicit.
pub fn evaluate_review(
    config: &MonitorConfig,
    bet: &Bet,
    current_price: Option<Decimal>,
    fresh_probability: Option<Decimal>,
    now: DateTime<Utc>,
) -> OrderReview {
    let submitted_at = bet.submitted_at.unwrap_or(bet.created_at);
    let age_hours = (now - submitted_at).num_hours();

    let price_delta_pct = match current_price {
        Some(current) if bet.limit_price > Decimal::ZERO => {
            ((current - bet.limit_price).abs() / bet.limit_price).round_dp(4)
        }
        _ => Decimal::ZERO,
    };
    let price_manipulation = price_delta_pct > config.price_move_threshold;

    let stagnant = age_hours > config.stagnation_hours;

    let ai_contradicts = match fresh_probability {
        Some(p) => match bet.market_side {
            MarketSide::Yes => p < dec!(0.5),
            MarketSide::No => p >= dec!(0.5),
        },
        None => false,
    };

    OrderReview {
        timestamp: now,
        price_delta_pct,
        age_hours,
        ai_contradicts,
        strike_issued: price_manipulation || stagnant || ai_contradicts,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub reviewed: usize,
    pub skipped_recent: usize,
    pub strikes_issued: usize,
    pub resets: usize,
    pub cancelled: usize,
    pub errors: usize,
}

pub struct OrderMonitor {
    store: Store,
    venue: Arc<dyn VenueClient>,
    reviser: Option<Arc<dyn ProbabilityReviser>>,
    config: MonitorConfig,
}

impl OrderMonitor {
    pub fn new(
        store: Store,
        venue: Arc<dyn VenueClient>,
        reviser: Option<Arc<dyn ProbabilityReviser>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            venue,
            reviser,
            config,
        }
    }

    /// One monitor pass over all open bets. Idempotent per wall-clock
    /// bucket: a bet reviewed within the last interval is skipped, so two
    /// back-to-back passes produce the same history as one.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<MonitorReport> {
        let mut report = MonitorReport::default();
        let open = self.store.open_bets().await?;
        debug!("monitor pass over {} open bets", open.len());

        for bet in open {
            match self.review_bet(&bet, now).await {
                Ok(ReviewOutcome::SkippedRecent) => report.skipped_recent += 1,
                Ok(ReviewOutcome::Clean) => {
                    report.reviewed += 1;
                    report.resets += 1;
                }
                Ok(ReviewOutcome::Strike) => {
                    report.reviewed += 1;
                    report.strikes_issued += 1;
                }
                Ok(ReviewOutcome::Cancelled) => {
                    report.reviewed += 1;
                    report.strikes_issued += 1;
                    report.cancelled += 1;
                }
                Err(err) => {
                    report.errors += 1;
                    error!("monitor review of bet {:?} failed: {}", bet.id, err);
                }
            }
        }

        info!(
            "monitor pass complete: reviewed={} strikes={} resets={} cancelled={} skipped={} errors={}",
            report.reviewed,
            report.strikes_issued,
            report.resets,
            report.cancelled,
            report.skipped_recent,
            report.errors
        );
        Ok(report)
    }

    async fn review_bet(&self, bet: &Bet, now: DateTime<Utc>) -> Result<ReviewOutcome> {
        let bet_id = bet
            .id
            .ok_or_else(|| crate::error::TipsterError::Integrity("open bet without id".into()))?;

        // idempotence bucket: one review per interval
        if let Some(last) = self.store.reviews_for_bet(bet_id).await?.last() {
            let elapsed = (now - last.timestamp).num_seconds();
            if elapsed >= 0 && (elapsed as u64) < self.config.interval_secs {
                return Ok(ReviewOutcome::SkippedRecent);
            }
        }

        let current_price = match self.venue.get_orderbook(&bet.token_id).await {
            Ok(book) => entry_price_from_book(&book),
            Err(err) => {
                warn!("monitor: no book for token {}: {}", bet.token_id, err);
                None
            }
        };

        let fresh_probability = match &self.reviser {
            Some(reviser) => match reviser.revise(&bet.firm, bet.market_id).await {
                Ok(p) => Some(p),
                Err(err) => {
                    warn!(
                        "monitor: re-evaluation unavailable for {} on market {}: {}",
                        bet.firm, bet.market_id, err
                    );
                    None
                }
            },
            None => None,
        };

        let review = evaluate_review(&self.config, bet, current_price, fresh_probability, now);
        let strikes = if review.strike_issued {
            bet.consecutive_strikes + 1
        } else {
            0
        };

        let persist_review = review.clone();
        self.store
            .tx(move |tx| {
                Box::pin(async move { tx.record_review(bet_id, &persist_review, strikes).await })
            })
            .await?;

        if !review.strike_issued {
            return Ok(ReviewOutcome::Clean);
        }

        info!(
            "strike {}/{} on bet {} (delta={} age={}h contradicts={})",
            strikes,
            self.config.strikes_to_cancel,
            bet_id,
            review.price_delta_pct,
            review.age_hours,
            review.ai_contradicts
        );

        if strikes < self.config.strikes_to_cancel {
            return Ok(ReviewOutcome::Strike);
        }

        self.cancel_bet(bet, bet_id, now).await?;
        Ok(ReviewOutcome::Cancelled)
    }

    async fn cancel_bet(&self, bet: &Bet, bet_id: i64, now: DateTime<Utc>) -> Result<()> {
        let order_id = bet.order_id.clone().unwrap_or_default();
        // cancel at the venue first; if that fails the strikes stay on the
        // row and the next pass tries again
        self.venue.cancel_order(&order_id).await?;

        let history = self.store.reviews_for_bet(bet_id).await?;
        let strike_count = self.config.strikes_to_cancel;
        let cancelled = CancelledOrder {
            order_id: order_id.clone(),
            firm: bet.firm.clone(),
            market_id: bet.market_id,
            strikes_history: history,
            cancel_reason: format!(
                "{strike_count} consecutive monitor strikes (last: price_delta or stagnation or model reversal)"
            ),
            cancelled_at: now,
        };

        self.store
            .tx(move |tx| {
                Box::pin(async move {
                    tx.insert_cancelled_order(&cancelled).await?;
                    tx.mark_bet_cancelled(bet_id).await?;
                    Ok(())
                })
            })
            .await?;

        info!("bet {} order {} cancelled after 3 strikes", bet_id, order_id);
        Ok(())
    }
}

enum ReviewOutcome {
    SkippedRecent,
    Clean,
    Strike,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn submitted_bet(price: Decimal, submitted_at: DateTime<Utc>, side: MarketSide) -> Bet {
        let mut bet = Bet::approved(
            1,
            "Gemini",
            7,
            "T1",
            side,
            dec!(1.50),
            price,
            dec!(0.3),
            submitted_at,
        );
        bet.status = crate::domain::BetStatus::Submitted;
        bet.submitted_at = Some(submitted_at);
        bet
    }

    #[test]
    fn price_move_over_threshold_strikes() {
        let config = MonitorConfig::default();
        let now = Utc::now();
        let bet = submitted_bet(dec!(0.30), now - Duration::hours(2), MarketSide::Yes);

        // 0.36 vs 0.30 is a 20% move
        let review = evaluate_review(&config, &bet, Some(dec!(0.36)), None, now);
        assert!(review.strike_issued);
        assert_eq!(review.price_delta_pct, dec!(0.2));
        assert!(!review.ai_contradicts);
    }

    #[test]
    fn small_move_is_clean() {
        let config = MonitorConfig::default();
        let now = Utc::now();
        let bet = submitted_bet(dec!(0.30), now - Duration::hours(2), MarketSide::Yes);

        let review = evaluate_review(&config, &bet, Some(dec!(0.32)), None, now);
        assert!(!review.strike_issued);
    }

    #[test]
    fn week_old_order_is_stagnant() {
        let config = MonitorConfig::default();
        let now = Utc::now();
        let bet = submitted_bet(dec!(0.30), now - Duration::hours(169), MarketSide::Yes);

        let review = evaluate_review(&config, &bet, Some(dec!(0.30)), None, now);
        assert!(review.strike_issued);
        assert_eq!(review.age_hours, 169);
    }

    #[test]
    fn model_reversal_contradicts_the_held_side() {
        let config = MonitorConfig::default();
        let now = Utc::now();

        let yes_bet = submitted_bet(dec!(0.30), now - Duration::hours(2), MarketSide::Yes);
        let review = evaluate_review(&config, &yes_bet, Some(dec!(0.30)), Some(dec!(0.42)), now);
        assert!(review.ai_contradicts);
        assert!(review.strike_issued);

        let no_bet = submitted_bet(dec!(0.30), now - Duration::hours(2), MarketSide::No);
        let review = evaluate_review(&config, &no_bet, Some(dec!(0.30)), Some(dec!(0.42)), now);
        assert!(!review.ai_contradicts);

        let review = evaluate_review(&config, &no_bet, Some(dec!(0.30)), Some(dec!(0.55)), now);
        assert!(review.ai_contradicts);
    }

    #[test]
    fn missing_inputs_never_strike_on_their_own() {
        let config = MonitorConfig::default();
        let now = Utc::now();
        let bet = submitted_bet(dec!(0.30), now - Duration::hours(2), MarketSide::Yes);

        let review = evaluate_review(&config, &bet, None, None, now);
        assert!(!review.strike_issued);
        assert_eq!(review.price_delta_pct, dec!(0));
    }

    /// Strike progression: strike, reset, strike again.
    #[test]
    fn strike_counter_resets_on_clean_review() {
        let config = MonitorConfig::default();
        let start = Utc::now();
        let mut bet = submitted_bet(dec!(0.30), start, MarketSide::Yes);

        // pass 1 at +2h: 20% move -> strike 1
        let r1 = evaluate_review(&config, &bet, Some(dec!(0.36)), None, start + Duration::hours(2));
        assert!(r1.strike_issued);
        bet.consecutive_strikes = if r1.strike_issued { bet.consecutive_strikes + 1 } else { 0 };
        assert_eq!(bet.consecutive_strikes, 1);

        // pass 2 at +32h: back to 0.30 -> reset
        let r2 = evaluate_review(&config, &bet, Some(dec!(0.30)), None, start + Duration::hours(32));
        assert!(!r2.strike_issued);
        bet.consecutive_strikes = if r2.strike_issued { bet.consecutive_strikes + 1 } else { 0 };
        assert_eq!(bet.consecutive_strikes, 0);

        // pass 3 at +62h: 33% move -> strike 1 again
        let r3 = evaluate_review(&config, &bet, Some(dec!(0.40)), None, start + Duration::hours(62));
        assert!(r3.strike_issued);
        bet.consecutive_strikes = if r3.strike_issued { bet.consecutive_strikes + 1 } else { 0 };
        assert_eq!(bet.consecutive_strikes, 1);
    }
}
