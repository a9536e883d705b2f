use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;

use super::{get_dec, Store, TxHandle};
use crate::domain::Portfolio;
use crate::error::Result;

fn map_portfolio(row: &SqliteRow) -> Result<Portfolio> {
    Ok(Portfolio {
        firm: row.try_get("firm")?,
        balance: get_dec(row, "balance")?,
        initial_balance: get_dec(row, "initial_balance")?,
        peak_balance: get_dec(row, "peak_balance")?,
        consecutive_wins: row.try_get("consecutive_wins")?,
        consecutive_losses: row.try_get("consecutive_losses")?,
        last_update: row.try_get("last_update")?,
    })
}

const SELECT: &str = "SELECT firm, balance, initial_balance, peak_balance, \
                      consecutive_wins, consecutive_losses, last_update FROM portfolios";

impl TxHandle {
    /// Create the firm's portfolio if it does not exist yet. Returns true if
    /// a row was inserted.
    pub async fn insert_portfolio_if_absent(
        &mut self,
        firm: &str,
        initial_balance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO portfolios \
             (firm, balance, initial_balance, peak_balance, consecutive_wins, consecutive_losses, last_update) \
             VALUES (?, ?, ?, ?, 0, 0, ?)",
        )
        .bind(firm)
        .bind(initial_balance.to_string())
        .bind(initial_balance.to_string())
        .bind(initial_balance.to_string())
        .bind(now)
        .execute(self.conn())
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            info!("Initialized portfolio for {} at {}", firm, initial_balance);
        }
        Ok(created)
    }

    pub async fn get_portfolio_for_update(&mut self, firm: &str) -> Result<Option<Portfolio>> {
        let row = sqlx::query(&format!("{SELECT} WHERE firm = ?"))
            .bind(firm)
            .fetch_optional(self.conn())
            .await?;
        row.as_ref().map(map_portfolio).transpose()
    }

    pub async fn save_portfolio(&mut self, portfolio: &Portfolio) -> Result<()> {
        sqlx::query(
            "UPDATE portfolios SET balance = ?, peak_balance = ?, consecutive_wins = ?, \
             consecutive_losses = ?, last_update = ? WHERE firm = ?",
        )
        .bind(portfolio.balance.to_string())
        .bind(portfolio.peak_balance.to_string())
        .bind(portfolio.consecutive_wins)
        .bind(portfolio.consecutive_losses)
        .bind(portfolio.last_update)
        .bind(&portfolio.firm)
        .execute(self.conn())
        .await?;
        Ok(())
    }
}

impl Store {
    pub async fn get_portfolio(&self, firm: &str) -> Result<Option<Portfolio>> {
        let row = sqlx::query(&format!("{SELECT} WHERE firm = ?"))
            .bind(firm)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(map_portfolio).transpose()
    }

    pub async fn list_portfolios(&self) -> Result<Vec<Portfolio>> {
        let rows = sqlx::query(&format!("{SELECT} ORDER BY firm"))
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(map_portfolio).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let store = Store::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();

        let created = store
            .tx(|tx| {
                Box::pin(async move {
                    let first = tx
                        .insert_portfolio_if_absent("ChatGPT", dec!(50), Utc::now())
                        .await?;
                    let second = tx
                        .insert_portfolio_if_absent("ChatGPT", dec!(50), Utc::now())
                        .await?;
                    Ok((first, second))
                })
            })
            .await
            .unwrap();
        assert_eq!(created, (true, false));

        let portfolio = store.get_portfolio("ChatGPT").await.unwrap().unwrap();
        assert_eq!(portfolio.balance, dec!(50));
        assert_eq!(portfolio.peak_balance, dec!(50));
    }

    #[tokio::test]
    async fn save_round_trips_streaks_and_peak() {
        let store = Store::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();

        store
            .tx(|tx| {
                Box::pin(async move {
                    tx.insert_portfolio_if_absent("Grok", dec!(50), Utc::now())
                        .await?;
                    let mut p = tx.get_portfolio_for_update("Grok").await?.unwrap();
                    p.apply_result(dec!(3.75), true, Utc::now());
                    tx.save_portfolio(&p).await
                })
            })
            .await
            .unwrap();

        let p = store.get_portfolio("Grok").await.unwrap().unwrap();
        assert_eq!(p.balance, dec!(53.75));
        assert_eq!(p.consecutive_wins, 1);
    }
}
