use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{get_dec, Store, TxHandle};
use crate::domain::DailyCounter;
use crate::error::Result;

fn map_counter(row: &SqliteRow) -> Result<DailyCounter> {
    Ok(DailyCounter {
        firm: row.try_get("firm")?,
        day: row.try_get("day")?,
        bets_count: row.try_get("bets_count")?,
        spent: get_dec(row, "spent")?,
        realized_loss: get_dec(row, "realized_loss")?,
    })
}

impl TxHandle {
    /// Load the firm's counter for `today`, lazily resetting if the stored
    /// row is from an earlier calendar day.
    pub async fn daily_counter(&mut self, firm: &str, today: NaiveDate) -> Result<DailyCounter> {
        let row = sqlx::query(
            "SELECT firm, day, bets_count, spent, realized_loss FROM daily_counters \
             WHERE firm = ? ORDER BY day DESC LIMIT 1",
        )
        .bind(firm)
        .fetch_optional(self.conn())
        .await?;

        match row {
            Some(row) => Ok(map_counter(&row)?.rolled(today)),
            None => Ok(DailyCounter::fresh(firm, today)),
        }
    }

    pub async fn save_daily_counter(&mut self, counter: &DailyCounter) -> Result<()> {
        sqlx::query(
            "INSERT INTO daily_counters (firm, day, bets_count, spent, realized_loss) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (firm, day) DO UPDATE SET \
                bets_count = excluded.bets_count, \
                spent = excluded.spent, \
                realized_loss = excluded.realized_loss",
        )
        .bind(&counter.firm)
        .bind(counter.day)
        .bind(counter.bets_count)
        .bind(counter.spent.to_string())
        .bind(counter.realized_loss.to_string())
        .execute(self.conn())
        .await?;
        Ok(())
    }
}

impl Store {
    pub async fn get_daily_counter(
        &self,
        firm: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyCounter>> {
        let row = sqlx::query(
            "SELECT firm, day, bets_count, spent, realized_loss FROM daily_counters \
             WHERE firm = ? AND day = ?",
        )
        .bind(firm)
        .bind(day)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(map_counter).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn counter_resets_lazily_on_day_rollover() {
        let store = Store::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();

        let day1 = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        store
            .tx(|tx| {
                Box::pin(async move {
                    let mut c = tx.daily_counter("Deepseek", day1).await?;
                    c.bets_count = 2;
                    c.spent = dec!(3.00);
                    tx.save_daily_counter(&c).await
                })
            })
            .await
            .unwrap();

        let rolled = store
            .tx(|tx| Box::pin(async move { tx.daily_counter("Deepseek", day2).await }))
            .await
            .unwrap();

        assert_eq!(rolled.day, day2);
        assert_eq!(rolled.bets_count, 0);
        assert_eq!(rolled.spent, dec!(0));

        // the day-1 row is untouched until the rolled counter is saved
        let stored = store.get_daily_counter("Deepseek", day1).await.unwrap().unwrap();
        assert_eq!(stored.bets_count, 2);
    }
}
