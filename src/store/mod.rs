//! Embedded SQLite store, WAL mode, one pooled handle per worker.
//!
//! The store is the single source of truth for all mutation. Writes go
//! through [`Store::tx`], which opens a transaction boundary only at the
//! outermost call: composite operations that call [`TxHandle::tx`] while
//! already inside a transaction share the outer one, and any error unwinds
//! the whole thing. This is what makes "save prediction, update firm stats"
//! style operations compose without `transaction within transaction` bugs.

mod bets;
mod counters;
mod cycles;
mod portfolios;
mod predictions;

pub use bets::{BetOutcome, FirmBetStats};

use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{Result, TipsterError};

/// SQLite storage adapter.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// A live write transaction. Depth 1 at the outermost boundary; nested
/// [`TxHandle::tx`] calls only bump the depth.
pub struct TxHandle {
    conn: PoolConnection<Sqlite>,
    depth: u32,
}

impl Store {
    /// Open (and create if missing) the database file.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!("Connected to SQLite store at {}", url);
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive and serializes access.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(SqliteJournalMode::Memory)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap reachability probe for health checks.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Run `f` inside a write transaction. Commit on success, roll back on
    /// any error. Re-entrant via [`TxHandle::tx`].
    pub async fn tx<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut TxHandle) -> BoxFuture<'c, Result<T>> + Send,
    {
        let conn = self.pool.acquire().await?;
        let mut handle = TxHandle { conn, depth: 1 };

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *handle.conn)
            .await
            .map_err(map_busy)?;

        match f(&mut handle).await {
            Ok(value) => {
                sqlx::query("COMMIT").execute(&mut *handle.conn).await?;
                Ok(value)
            }
            Err(err) => {
                // best effort: the connection is dropped back to the pool anyway
                let _ = sqlx::query("ROLLBACK").execute(&mut *handle.conn).await;
                debug!("transaction rolled back: {}", err);
                Err(err)
            }
        }
    }

    /// Create tables and apply forward-only additive migrations.
    pub async fn migrate(&self) -> Result<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        // Columns added after first release. Startup inspects the live schema
        // and issues add-column statements for anything missing.
        for (table, column, ddl) in ADDITIVE_COLUMNS {
            if !self.column_exists(table, column).await? {
                info!("migrating: adding {}.{}", table, column);
                sqlx::query(ddl).execute(&self.pool).await?;
            }
        }

        info!("Store migrations completed");
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .any(|row| row.get::<String, _>("name") == column))
    }
}

impl TxHandle {
    /// Nested transaction: no new boundary is begun. Commit or rollback
    /// applies only at the outermost [`Store::tx`] call.
    pub async fn tx<T, F>(&mut self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut TxHandle) -> BoxFuture<'c, Result<T>> + Send,
    {
        self.depth += 1;
        let out = f(self).await;
        self.depth -= 1;
        out
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

fn map_busy(err: sqlx::Error) -> TipsterError {
    if let sqlx::Error::Database(db) = &err {
        let msg = db.message().to_ascii_lowercase();
        if msg.contains("locked") || msg.contains("busy") {
            return TipsterError::Transient(format!("store busy: {}", db.message()));
        }
    }
    TipsterError::Database(err)
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS portfolios (
        firm TEXT PRIMARY KEY,
        balance TEXT NOT NULL,
        initial_balance TEXT NOT NULL,
        peak_balance TEXT NOT NULL,
        consecutive_wins INTEGER NOT NULL DEFAULT 0,
        consecutive_losses INTEGER NOT NULL DEFAULT 0,
        last_update TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        firm TEXT NOT NULL,
        market_id INTEGER NOT NULL,
        probability TEXT NOT NULL,
        confidence TEXT NOT NULL,
        sentiment_score TEXT NOT NULL,
        news_score TEXT NOT NULL,
        technical_score TEXT NOT NULL,
        fundamental_score TEXT NOT NULL,
        volatility_score TEXT NOT NULL,
        sentiment_analysis TEXT NOT NULL DEFAULT '',
        news_analysis TEXT NOT NULL DEFAULT '',
        technical_analysis TEXT NOT NULL DEFAULT '',
        fundamental_analysis TEXT NOT NULL DEFAULT '',
        volatility_analysis TEXT NOT NULL DEFAULT '',
        probability_reasoning TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prediction_id INTEGER NOT NULL,
        firm TEXT NOT NULL,
        market_id INTEGER NOT NULL,
        token_id TEXT NOT NULL,
        side TEXT NOT NULL DEFAULT 'BUY',
        market_side TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT 'Other',
        size TEXT NOT NULL,
        limit_price TEXT NOT NULL,
        status TEXT NOT NULL,
        order_id TEXT,
        client_order_id TEXT NOT NULL,
        expected_value TEXT NOT NULL,
        submitted_at TEXT,
        actual_result INTEGER,
        profit_loss TEXT,
        error TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bet_reviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bet_id INTEGER NOT NULL,
        reviewed_at TEXT NOT NULL,
        price_delta_pct TEXT NOT NULL,
        age_hours INTEGER NOT NULL,
        ai_contradicts INTEGER NOT NULL,
        strike_issued INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cancelled_orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id TEXT NOT NULL,
        firm TEXT NOT NULL,
        market_id INTEGER NOT NULL,
        strikes_history TEXT NOT NULL,
        cancel_reason TEXT NOT NULL,
        cancelled_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS daily_counters (
        firm TEXT NOT NULL,
        day TEXT NOT NULL,
        bets_count INTEGER NOT NULL DEFAULT 0,
        spent TEXT NOT NULL,
        realized_loss TEXT NOT NULL,
        PRIMARY KEY (firm, day)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cycles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        status TEXT NOT NULL,
        markets_fetched INTEGER NOT NULL DEFAULT 0,
        markets_tradable INTEGER NOT NULL DEFAULT 0,
        bets_approved INTEGER NOT NULL DEFAULT 0,
        bets_executed INTEGER NOT NULL DEFAULT 0,
        bets_failed INTEGER NOT NULL DEFAULT 0,
        per_category_counts TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_predictions_firm_market ON predictions(firm, market_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status)",
    "CREATE INDEX IF NOT EXISTS idx_bets_firm ON bets(firm, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_bet_reviews_bet ON bet_reviews(bet_id, reviewed_at)",
];

const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    (
        "bets",
        "consecutive_strikes",
        "ALTER TABLE bets ADD COLUMN consecutive_strikes INTEGER NOT NULL DEFAULT 0",
    ),
    (
        "bets",
        "redeemed_at",
        "ALTER TABLE bets ADD COLUMN redeemed_at TEXT",
    ),
    (
        "predictions",
        "skip_reason",
        "ALTER TABLE predictions ADD COLUMN skip_reason TEXT",
    ),
];

// ---- row helpers shared by the entity modules ----

pub(crate) fn get_dec(row: &SqliteRow, col: &str) -> Result<Decimal> {
    let raw: String = row.try_get(col)?;
    Decimal::from_str(&raw)
        .map_err(|e| TipsterError::Integrity(format!("bad decimal in column {col}: {e}")))
}

pub(crate) fn get_opt_dec(row: &SqliteRow, col: &str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.try_get(col)?;
    match raw {
        None => Ok(None),
        Some(s) => Decimal::from_str(&s)
            .map(Some)
            .map_err(|e| TipsterError::Integrity(format!("bad decimal in column {col}: {e}"))),
    }
}
