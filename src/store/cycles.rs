use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{Store, TxHandle};
use crate::domain::{CycleRecord, CycleStatus};
use crate::error::{Result, TipsterError};

const SELECT: &str = "SELECT id, started_at, finished_at, status, markets_fetched, \
    markets_tradable, bets_approved, bets_executed, bets_failed, per_category_counts FROM cycles";

fn map_cycle(row: &SqliteRow) -> Result<CycleRecord> {
    let status: String = row.try_get("status")?;
    let counts_json: String = row.try_get("per_category_counts")?;
    Ok(CycleRecord {
        id: Some(row.try_get("id")?),
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        status: status
            .parse::<CycleStatus>()
            .map_err(|e| TipsterError::Integrity(format!("bad cycle status: {e}")))?,
        markets_fetched: row.try_get("markets_fetched")?,
        markets_tradable: row.try_get("markets_tradable")?,
        bets_approved: row.try_get("bets_approved")?,
        bets_executed: row.try_get("bets_executed")?,
        bets_failed: row.try_get("bets_failed")?,
        per_category_counts: serde_json::from_str(&counts_json)?,
    })
}

impl TxHandle {
    pub async fn open_cycle(&mut self, record: &CycleRecord) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO cycles (started_at, status, per_category_counts) \
             VALUES (?, ?, '{}') RETURNING id",
        )
        .bind(record.started_at)
        .bind(record.status.as_str())
        .fetch_one(self.conn())
        .await?;
        Ok(row.get("id"))
    }

    pub async fn close_cycle(&mut self, id: i64, record: &CycleRecord) -> Result<()> {
        sqlx::query(
            "UPDATE cycles SET finished_at = ?, status = ?, markets_fetched = ?, \
             markets_tradable = ?, bets_approved = ?, bets_executed = ?, bets_failed = ?, \
             per_category_counts = ? WHERE id = ?",
        )
        .bind(record.finished_at)
        .bind(record.status.as_str())
        .bind(record.markets_fetched)
        .bind(record.markets_tradable)
        .bind(record.bets_approved)
        .bind(record.bets_executed)
        .bind(record.bets_failed)
        .bind(serde_json::to_string(&record.per_category_counts)?)
        .bind(id)
        .execute(self.conn())
        .await?;
        Ok(())
    }
}

impl Store {
    pub async fn latest_cycles(&self, limit: i64) -> Result<Vec<CycleRecord>> {
        let rows = sqlx::query(&format!("{SELECT} ORDER BY started_at DESC LIMIT ?"))
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(map_cycle).collect()
    }
}
