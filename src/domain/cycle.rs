use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleStatus {
    Running,
    Completed,
    /// Deadline hit before all firms finished; counts cover completed work.
    Partial,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CycleStatus {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "PARTIAL" => Ok(Self::Partial),
            "FAILED" => Ok(Self::Failed),
            _ => Err("unknown cycle status"),
        }
    }
}

/// One row per orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: CycleStatus,
    pub markets_fetched: i64,
    pub markets_tradable: i64,
    pub bets_approved: i64,
    pub bets_executed: i64,
    pub bets_failed: i64,
    /// Tradable-market counts keyed by category name.
    pub per_category_counts: BTreeMap<String, i64>,
}

impl CycleRecord {
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            started_at: now,
            finished_at: None,
            status: CycleStatus::Running,
            markets_fetched: 0,
            markets_tradable: 0,
            bets_approved: 0,
            bets_executed: 0,
            bets_failed: 0,
            per_category_counts: BTreeMap::new(),
        }
    }
}
