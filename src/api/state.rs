use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::context::AppContext;

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: Arc<AppContext>,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
