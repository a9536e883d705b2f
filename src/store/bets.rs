use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{get_dec, get_opt_dec, Store, TxHandle};
use crate::domain::{
    Bet, BetSide, BetStatus, CancelledOrder, MarketCategory, MarketSide, OrderReview,
};
use crate::error::{Result, TipsterError};

const SELECT: &str = "SELECT id, prediction_id, firm, market_id, token_id, side, market_side, \
    category, size, limit_price, status, order_id, client_order_id, expected_value, \
    submitted_at, actual_result, profit_loss, error, consecutive_strikes, redeemed_at, \
    created_at FROM bets";

fn map_bet(row: &SqliteRow) -> Result<Bet> {
    let status: String = row.try_get("status")?;
    let market_side: String = row.try_get("market_side")?;
    Ok(Bet {
        id: Some(row.try_get("id")?),
        prediction_id: row.try_get("prediction_id")?,
        firm: row.try_get("firm")?,
        market_id: row.try_get("market_id")?,
        token_id: row.try_get("token_id")?,
        side: BetSide::Buy,
        market_side: market_side
            .parse::<MarketSide>()
            .map_err(|e| TipsterError::Integrity(format!("bad market_side: {e}")))?,
        size: get_dec(row, "size")?,
        limit_price: get_dec(row, "limit_price")?,
        status: status
            .parse::<BetStatus>()
            .map_err(|e| TipsterError::Integrity(format!("bad bet status: {e}")))?,
        order_id: row.try_get("order_id")?,
        client_order_id: row.try_get("client_order_id")?,
        expected_value: get_dec(row, "expected_value")?,
        submitted_at: row.try_get("submitted_at")?,
        actual_result: row
            .try_get::<Option<i64>, _>("actual_result")?
            .map(|v| v != 0),
        profit_loss: get_opt_dec(row, "profit_loss")?,
        error: row.try_get("error")?,
        consecutive_strikes: row.try_get("consecutive_strikes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_review(row: &SqliteRow) -> Result<OrderReview> {
    Ok(OrderReview {
        timestamp: row.try_get("reviewed_at")?,
        price_delta_pct: get_dec(row, "price_delta_pct")?,
        age_hours: row.try_get("age_hours")?,
        ai_contradicts: row.try_get::<i64, _>("ai_contradicts")? != 0,
        strike_issued: row.try_get::<i64, _>("strike_issued")? != 0,
    })
}

/// Aggregate bet stats per firm, for the leaderboard views.
#[derive(Debug, Clone, Default)]
pub struct FirmBetStats {
    pub total_bets: i64,
    pub wins: i64,
    pub losses: i64,
    pub profit: Decimal,
}

/// Per-bet outcome row for the learning sweep. Carries the persisted
/// category, which the full `Bet` record does not expose.
#[derive(Debug, Clone)]
pub struct BetOutcome {
    pub category: MarketCategory,
    pub size: Decimal,
    pub expected_value: Decimal,
    pub actual_result: Option<bool>,
    pub profit_loss: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl TxHandle {
    /// Insert an APPROVED bet row. Callers must commit this before any
    /// submission attempt: a `[BET]` log line without a row is the bug class
    /// this ordering exists to kill.
    pub async fn insert_bet(&mut self, bet: &Bet, category: MarketCategory) -> Result<i64> {
        if bet.status != BetStatus::Approved {
            return Err(TipsterError::Integrity(format!(
                "bets are inserted as APPROVED, got {}",
                bet.status
            )));
        }
        let row = sqlx::query(
            "INSERT INTO bets (prediction_id, firm, market_id, token_id, side, market_side, \
             category, size, limit_price, status, order_id, client_order_id, expected_value, \
             submitted_at, consecutive_strikes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL, 0, ?) \
             RETURNING id",
        )
        .bind(bet.prediction_id)
        .bind(&bet.firm)
        .bind(bet.market_id)
        .bind(&bet.token_id)
        .bind(bet.side.as_str())
        .bind(bet.market_side.as_str())
        .bind(category.as_str())
        .bind(bet.size.to_string())
        .bind(bet.limit_price.to_string())
        .bind(BetStatus::Approved.as_str())
        .bind(&bet.client_order_id)
        .bind(bet.expected_value.to_string())
        .bind(bet.created_at)
        .fetch_one(self.conn())
        .await?;

        Ok(row.get("id"))
    }

    pub async fn get_bet_for_update(&mut self, id: i64) -> Result<Bet> {
        let row = sqlx::query(&format!("{SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.conn())
            .await?
            .ok_or_else(|| TipsterError::Integrity(format!("bet {id} not found")))?;
        map_bet(&row)
    }

    async fn set_status(&mut self, id: i64, to: BetStatus) -> Result<Bet> {
        let mut bet = self.get_bet_for_update(id).await?;
        bet.status.assert_transition(to)?;
        sqlx::query("UPDATE bets SET status = ? WHERE id = ?")
            .bind(to.as_str())
            .bind(id)
            .execute(self.conn())
            .await?;
        debug!("bet {} {} -> {}", id, bet.status, to);
        bet.status = to;
        Ok(bet)
    }

    pub async fn mark_bet_submitted(
        &mut self,
        id: i64,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Bet> {
        let bet = self.set_status(id, BetStatus::Submitted).await?;
        sqlx::query("UPDATE bets SET order_id = ?, submitted_at = ? WHERE id = ?")
            .bind(order_id)
            .bind(now)
            .bind(id)
            .execute(self.conn())
            .await?;
        Ok(Bet {
            order_id: Some(order_id.to_string()),
            submitted_at: Some(now),
            ..bet
        })
    }

    pub async fn mark_bet_failed(&mut self, id: i64, error: &str) -> Result<Bet> {
        let bet = self.set_status(id, BetStatus::Failed).await?;
        sqlx::query("UPDATE bets SET error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(self.conn())
            .await?;
        Ok(Bet {
            error: Some(error.to_string()),
            ..bet
        })
    }

    pub async fn mark_bet_filled(&mut self, id: i64) -> Result<Bet> {
        self.set_status(id, BetStatus::Filled).await
    }

    pub async fn mark_bet_cancelled(&mut self, id: i64) -> Result<Bet> {
        self.set_status(id, BetStatus::Cancelled).await
    }

    /// Append a monitor review and persist the new consecutive-strike count.
    pub async fn record_review(
        &mut self,
        bet_id: i64,
        review: &OrderReview,
        consecutive_strikes: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO bet_reviews (bet_id, reviewed_at, price_delta_pct, age_hours, \
             ai_contradicts, strike_issued) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(bet_id)
        .bind(review.timestamp)
        .bind(review.price_delta_pct.to_string())
        .bind(review.age_hours)
        .bind(review.ai_contradicts as i64)
        .bind(review.strike_issued as i64)
        .execute(self.conn())
        .await?;

        sqlx::query("UPDATE bets SET consecutive_strikes = ? WHERE id = ?")
            .bind(consecutive_strikes)
            .bind(bet_id)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    /// Record the venue's resolution for a filled bet.
    pub async fn resolve_bet(&mut self, id: i64, won: bool, profit_loss: Decimal) -> Result<()> {
        let bet = self.get_bet_for_update(id).await?;
        if bet.status != BetStatus::Filled {
            return Err(TipsterError::Integrity(format!(
                "cannot resolve bet {id} in status {}",
                bet.status
            )));
        }
        sqlx::query("UPDATE bets SET actual_result = ?, profit_loss = ? WHERE id = ?")
            .bind(won as i64)
            .bind(profit_loss.to_string())
            .bind(id)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    pub async fn mark_bet_redeemed(&mut self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE bets SET redeemed_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    pub async fn insert_cancelled_order(&mut self, cancelled: &CancelledOrder) -> Result<()> {
        sqlx::query(
            "INSERT INTO cancelled_orders (order_id, firm, market_id, strikes_history, \
             cancel_reason, cancelled_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&cancelled.order_id)
        .bind(&cancelled.firm)
        .bind(cancelled.market_id)
        .bind(serde_json::to_string(&cancelled.strikes_history)?)
        .bind(&cancelled.cancel_reason)
        .bind(cancelled.cancelled_at)
        .execute(self.conn())
        .await?;
        Ok(())
    }
}

impl Store {
    /// SUBMITTED and unresolved: the order-monitor working set.
    pub async fn open_bets(&self) -> Result<Vec<Bet>> {
        let rows = sqlx::query(&format!(
            "{SELECT} WHERE status = 'SUBMITTED' AND actual_result IS NULL ORDER BY id"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_bet).collect()
    }

    /// FILLED but not yet resolved: the reconciliation working set.
    pub async fn unresolved_filled_bets(&self) -> Result<Vec<Bet>> {
        let rows = sqlx::query(&format!(
            "{SELECT} WHERE status = 'FILLED' AND actual_result IS NULL ORDER BY id"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_bet).collect()
    }

    /// Won bets whose on-chain redemption has not gone through yet.
    pub async fn unredeemed_wins(&self) -> Result<Vec<Bet>> {
        let rows = sqlx::query(&format!(
            "{SELECT} WHERE actual_result = 1 AND redeemed_at IS NULL ORDER BY id"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_bet).collect()
    }

    pub async fn recent_bets(&self, firm: Option<&str>, limit: i64) -> Result<Vec<Bet>> {
        let rows = match firm {
            Some(firm) => {
                sqlx::query(&format!(
                    "{SELECT} WHERE firm = ? ORDER BY created_at DESC LIMIT ?"
                ))
                .bind(firm)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(&format!("{SELECT} ORDER BY created_at DESC LIMIT ?"))
                    .bind(limit)
                    .fetch_all(self.pool())
                    .await?
            }
        };
        rows.iter().map(map_bet).collect()
    }

    /// Stake locked in open (submitted or filled, unresolved) bets.
    pub async fn open_exposure(&self, firm: &str) -> Result<Decimal> {
        let bets = self.open_positions(firm).await?;
        Ok(bets.iter().map(|b| b.size).sum())
    }

    pub async fn open_positions(&self, firm: &str) -> Result<Vec<Bet>> {
        let rows = sqlx::query(&format!(
            "{SELECT} WHERE firm = ? AND actual_result IS NULL \
             AND status IN ('SUBMITTED', 'FILLED') ORDER BY id"
        ))
        .bind(firm)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_bet).collect()
    }

    pub async fn open_category_exposure(
        &self,
        firm: &str,
        category: MarketCategory,
    ) -> Result<Decimal> {
        let rows = sqlx::query(
            "SELECT size FROM bets WHERE firm = ? AND category = ? AND actual_result IS NULL \
             AND status IN ('SUBMITTED', 'FILLED')",
        )
        .bind(firm)
        .bind(category.as_str())
        .fetch_all(self.pool())
        .await?;

        let mut total = Decimal::ZERO;
        for row in &rows {
            total += get_dec(row, "size")?;
        }
        Ok(total)
    }

    pub async fn reviews_for_bet(&self, bet_id: i64) -> Result<Vec<OrderReview>> {
        let rows = sqlx::query(
            "SELECT reviewed_at, price_delta_pct, age_hours, ai_contradicts, strike_issued \
             FROM bet_reviews WHERE bet_id = ? ORDER BY reviewed_at",
        )
        .bind(bet_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_review).collect()
    }

    pub async fn cancelled_orders(&self, limit: i64) -> Result<Vec<CancelledOrder>> {
        let rows = sqlx::query(
            "SELECT order_id, firm, market_id, strikes_history, cancel_reason, cancelled_at \
             FROM cancelled_orders ORDER BY cancelled_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let history_json: String = row.try_get("strikes_history")?;
                Ok(CancelledOrder {
                    order_id: row.try_get("order_id")?,
                    firm: row.try_get("firm")?,
                    market_id: row.try_get("market_id")?,
                    strikes_history: serde_json::from_str(&history_json)?,
                    cancel_reason: row.try_get("cancel_reason")?,
                    cancelled_at: row.try_get("cancelled_at")?,
                })
            })
            .collect()
    }

    /// Submitted-or-later bets for one firm since `cutoff`, oldest first.
    pub async fn bet_outcomes_since(
        &self,
        firm: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BetOutcome>> {
        let rows = sqlx::query(
            "SELECT category, size, expected_value, actual_result, profit_loss, created_at \
             FROM bets WHERE firm = ? AND created_at >= ? \
             AND status IN ('SUBMITTED', 'FILLED', 'CANCELLED') ORDER BY created_at",
        )
        .bind(firm)
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let category: String = row.try_get("category")?;
                Ok(BetOutcome {
                    category: MarketCategory::parse_loose(&category),
                    size: get_dec(row, "size")?,
                    expected_value: get_dec(row, "expected_value")?,
                    actual_result: row
                        .try_get::<Option<i64>, _>("actual_result")?
                        .map(|v| v != 0),
                    profit_loss: get_opt_dec(row, "profit_loss")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn firm_bet_stats(&self, firm: &str) -> Result<FirmBetStats> {
        let rows = sqlx::query(
            "SELECT actual_result, profit_loss FROM bets WHERE firm = ? \
             AND status IN ('SUBMITTED', 'FILLED', 'CANCELLED')",
        )
        .bind(firm)
        .fetch_all(self.pool())
        .await?;

        let mut stats = FirmBetStats::default();
        for row in &rows {
            stats.total_bets += 1;
            match row.try_get::<Option<i64>, _>("actual_result")? {
                Some(1) => stats.wins += 1,
                Some(_) => stats.losses += 1,
                None => {}
            }
            if let Some(pnl) = get_opt_dec(row, "profit_loss")? {
                stats.profit += pnl;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn seeded_store() -> (Store, i64) {
        let store = Store::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();

        let bet_id = store
            .tx(|tx| {
                Box::pin(async move {
                    let bet = Bet::approved(
                        1,
                        "ChatGPT",
                        42,
                        "T1",
                        MarketSide::Yes,
                        dec!(1.50),
                        dec!(0.400),
                        dec!(0.52),
                        Utc::now(),
                    );
                    tx.insert_bet(&bet, MarketCategory::Crypto).await
                })
            })
            .await
            .unwrap();
        (store, bet_id)
    }

    #[tokio::test]
    async fn submission_follows_an_approved_row() {
        let (store, bet_id) = seeded_store().await;

        let bet = store
            .tx(|tx| {
                Box::pin(async move { tx.mark_bet_submitted(bet_id, "ORD-1", Utc::now()).await })
            })
            .await
            .unwrap();

        assert_eq!(bet.status, BetStatus::Submitted);
        assert_eq!(bet.order_id.as_deref(), Some("ORD-1"));

        let open = store.open_bets().await.unwrap();
        assert_eq!(open.len(), 1);
        assert!(open[0].is_open());
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let (store, bet_id) = seeded_store().await;

        store
            .tx(|tx| {
                Box::pin(async move {
                    tx.mark_bet_submitted(bet_id, "ORD-1", Utc::now()).await?;
                    tx.mark_bet_filled(bet_id).await
                })
            })
            .await
            .unwrap();

        let err = store
            .tx(|tx| Box::pin(async move { tx.mark_bet_cancelled(bet_id).await }))
            .await
            .unwrap_err();
        assert!(matches!(err, TipsterError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn reviews_accumulate_and_strikes_persist() {
        let (store, bet_id) = seeded_store().await;

        store
            .tx(|tx| {
                Box::pin(async move {
                    tx.mark_bet_submitted(bet_id, "ORD-1", Utc::now()).await?;
                    let review = OrderReview {
                        timestamp: Utc::now(),
                        price_delta_pct: dec!(0.20),
                        age_hours: 2,
                        ai_contradicts: false,
                        strike_issued: true,
                    };
                    tx.record_review(bet_id, &review, 1).await
                })
            })
            .await
            .unwrap();

        let reviews = store.reviews_for_bet(bet_id).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert!(reviews[0].strike_issued);

        let open = store.open_bets().await.unwrap();
        assert_eq!(open[0].consecutive_strikes, 1);
    }

    #[tokio::test]
    async fn outcome_rows_filter_by_firm_and_cutoff() {
        let (store, bet_id) = seeded_store().await;

        store
            .tx(|tx| {
                Box::pin(async move {
                    tx.mark_bet_submitted(bet_id, "ORD-1", Utc::now()).await?;
                    tx.mark_bet_filled(bet_id).await?;
                    tx.resolve_bet(bet_id, true, dec!(2.10)).await
                })
            })
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(7);
        let outcomes = store.bet_outcomes_since("ChatGPT", cutoff).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].category, MarketCategory::Crypto);
        assert_eq!(outcomes[0].actual_result, Some(true));
        assert_eq!(outcomes[0].profit_loss, Some(dec!(2.10)));

        assert!(store
            .bet_outcomes_since("Gemini", cutoff)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .bet_outcomes_since("ChatGPT", Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn exposure_counts_only_open_bets() {
        let (store, bet_id) = seeded_store().await;

        assert_eq!(store.open_exposure("ChatGPT").await.unwrap(), dec!(0));

        store
            .tx(|tx| {
                Box::pin(async move { tx.mark_bet_submitted(bet_id, "ORD-1", Utc::now()).await })
            })
            .await
            .unwrap();
        assert_eq!(store.open_exposure("ChatGPT").await.unwrap(), dec!(1.50));
        assert_eq!(
            store
                .open_category_exposure("ChatGPT", MarketCategory::Crypto)
                .await
                .unwrap(),
            dec!(1.50)
        );

        store
            .tx(|tx| {
                Box::pin(async move {
                    tx.mark_bet_filled(bet_id).await?;
                    tx.resolve_bet(bet_id, true, dec!(2.10)).await
                })
            })
            .await
            .unwrap();
        assert_eq!(store.open_exposure("ChatGPT").await.unwrap(), dec!(0));
    }
}
