//! Order submission state machine.
//!
//! The APPROVED row is committed before the venue is contacted, so a crash
//! between the two leaves an auditable intent instead of a phantom order.
//! The venue call itself happens outside any transaction; a second
//! transaction then records SUBMITTED or FAILED. Success means errno == 0,
//! never the absence of an exception.

use chrono::Utc;
use tracing::{error, info};

use crate::domain::{Bet, MarketCategory};
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};
use crate::store::Store;
use crate::venue::{PlaceOrderRequest, VenueClient};

use super::ev::clamp_order_price;

/// Persist and submit one approved bet. Returns the bet in its final state
/// (SUBMITTED or FAILED); only infrastructure failures surface as errors.
pub async fn submit_bet(
    store: &Store,
    venue: &dyn VenueClient,
    bet: Bet,
    category: MarketCategory,
) -> Result<Bet> {
    let today = Utc::now().date_naive();
    let price = clamp_order_price(bet.limit_price);
    let size = bet.size.round_dp(2);
    let bet = Bet {
        limit_price: price,
        size,
        ..bet
    };
    let firm = bet.firm.clone();
    let request = PlaceOrderRequest {
        market_id: bet.market_id,
        token_id: bet.token_id.clone(),
        side: bet.side,
        price,
        amount: size,
        check_approval: true,
        client_order_id: bet.client_order_id.clone(),
    };

    // Transaction 1: the bet intent becomes canonical before any venue call,
    // and the daily counters move with it.
    let insert_bet = bet.clone();
    let bet_id = store
        .tx(move |tx| {
            Box::pin(async move {
                let id = tx.insert_bet(&insert_bet, category).await?;
                let mut counter = tx.daily_counter(&insert_bet.firm, today).await?;
                counter.bets_count += 1;
                counter.spent += insert_bet.size;
                tx.save_daily_counter(&counter).await?;
                Ok(id)
            })
        })
        .await?;

    info!(
        "[BET] {} market={} token={} side={} size={} price={} (bet_id={})",
        firm,
        bet.market_id,
        bet.token_id,
        bet.market_side.as_str(),
        size,
        price,
        bet_id
    );

    // Venue call, bounded retries on transient codes only.
    let placed = retry::with_backoff(
        RetryPolicy::venue(),
        "place_order",
        retry::retry_transient,
        || venue.place_order(&request),
    )
    .await;

    // Transaction 2: record the outcome.
    match placed {
        Ok(order) => {
            let order_id = order.order_id.clone();
            let updated = store
                .tx(move |tx| {
                    Box::pin(async move {
                        tx.mark_bet_submitted(bet_id, &order_id, Utc::now()).await
                    })
                })
                .await?;
            info!(
                "[BET] {} bet_id={} submitted as order {}",
                firm, bet_id, order.order_id
            );
            Ok(updated)
        }
        Err(err) => {
            let reason = err.to_string();
            error!("[BET] {} bet_id={} submission failed: {}", firm, bet_id, reason);
            let failure = reason.clone();
            let updated = store
                .tx(move |tx| {
                    Box::pin(async move { tx.mark_bet_failed(bet_id, &failure).await })
                })
                .await?;
            match err {
                // config-level failures must still abort the process
                TipsterError::InvalidConfig(_) | TipsterError::Config(_) => Err(err),
                _ => Ok(updated),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BetStatus, MarketSide};
    use crate::venue::{
        BalanceSnapshot, MarketDetail, MarketSummary, Orderbook, PlacedOrder, RedeemOutcome,
        VenuePosition, VenueTrade,
    };
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Venue double that scripts place_order outcomes.
    struct ScriptedVenue {
        errno: i64,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VenueClient for ScriptedVenue {
        async fn enable_trading(&self) -> Result<()> {
            Ok(())
        }
        async fn get_markets(&self, _: u32, _: u32) -> Result<Vec<MarketSummary>> {
            Ok(vec![])
        }
        async fn get_market(&self, _: i64) -> Result<Option<MarketDetail>> {
            Ok(None)
        }
        async fn get_orderbook(&self, _: &str) -> Result<Orderbook> {
            Ok(Orderbook::default())
        }
        async fn place_order(&self, _: &PlaceOrderRequest) -> Result<PlacedOrder> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.errno == 0 {
                Ok(PlacedOrder {
                    order_id: "ORD-77".into(),
                })
            } else {
                Err(crate::venue::decode_errno(self.errno, "Invalid area"))
            }
        }
        async fn cancel_order(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn redeem(&self, _: i64) -> Result<RedeemOutcome> {
            Ok(RedeemOutcome::Submitted { tx_hash: None })
        }
        async fn get_my_trades(&self, _: u32) -> Result<Vec<VenueTrade>> {
            Ok(vec![])
        }
        async fn get_my_positions(&self, _: u32) -> Result<Vec<VenuePosition>> {
            Ok(vec![])
        }
        async fn get_my_balances(&self) -> Result<BalanceSnapshot> {
            Ok(BalanceSnapshot {
                total: dec!(0),
                available: dec!(0),
            })
        }
    }

    fn approved_bet() -> Bet {
        Bet::approved(
            1,
            "ChatGPT",
            42,
            "T1",
            MarketSide::Yes,
            dec!(1.50),
            dec!(0.4),
            dec!(1.02),
            Utc::now(),
        )
    }

    async fn store() -> Store {
        let store = Store::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn happy_path_submits_and_counts() {
        let store = store().await;
        let venue = ScriptedVenue {
            errno: 0,
            calls: AtomicU32::new(0),
        };

        let bet = submit_bet(&store, &venue, approved_bet(), MarketCategory::Crypto)
            .await
            .unwrap();

        assert_eq!(bet.status, BetStatus::Submitted);
        assert_eq!(bet.order_id.as_deref(), Some("ORD-77"));
        // price rounded to 3dp on the way out
        assert_eq!(bet.limit_price, dec!(0.400));

        let counter = store
            .get_daily_counter("ChatGPT", Utc::now().date_naive())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.bets_count, 1);
        assert_eq!(counter.spent, dec!(1.50));
    }

    #[tokio::test]
    async fn geographic_rejection_persists_failed_without_retry() {
        let store = store().await;
        let venue = ScriptedVenue {
            errno: 10403,
            calls: AtomicU32::new(0),
        };

        let bet = submit_bet(&store, &venue, approved_bet(), MarketCategory::Crypto)
            .await
            .unwrap();

        assert_eq!(bet.status, BetStatus::Failed);
        assert!(bet.error.as_deref().unwrap_or("").contains("10403"));
        // business errno is never retried
        assert_eq!(venue.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn approved_row_exists_even_when_submission_fails() {
        let store = store().await;
        let venue = ScriptedVenue {
            errno: 10403,
            calls: AtomicU32::new(0),
        };

        submit_bet(&store, &venue, approved_bet(), MarketCategory::Crypto)
            .await
            .unwrap();

        // the bet row is there with a full audit trail
        let bets = store.recent_bets(Some("ChatGPT"), 10).await.unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].status, BetStatus::Failed);
        // the daily counter moved at approval time
        let counter = store
            .get_daily_counter("ChatGPT", Utc::now().date_naive())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.bets_count, 1);
    }
}
