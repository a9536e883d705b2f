use thiserror::Error;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum TipsterError {
    // Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store integrity violation: {0}")]
    Integrity(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Timeouts, locked stores, flaky upstreams. Retry with backoff.
    #[error("Transient failure: {0}")]
    Transient(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Venue errors
    /// Non-zero errno from the venue's signed-order API. Never retried.
    #[error("Venue error {errno}: {message}")]
    Venue { errno: i64, message: String },

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    // Model output errors
    #[error("Decision schema violation: {0}")]
    Schema(String),

    // Risk errors
    /// Tier veto. Expected control flow, not a failure.
    #[error("Firm suspended: {0}")]
    Suspended(String),

    // State machine errors
    #[error("Invalid bet transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Cycle errors
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for TipsterError
pub type Result<T> = std::result::Result<T, TipsterError>;

impl TipsterError {
    /// Whether a retry with backoff has any chance of helping.
    pub fn is_retryable(&self) -> bool {
        match self {
            TipsterError::Transient(_) | TipsterError::RateLimited(_) => true,
            TipsterError::Http(e) => e.is_timeout() || e.is_connect(),
            TipsterError::Database(sqlx::Error::PoolTimedOut) => true,
            TipsterError::Database(sqlx::Error::Database(db)) => {
                // SQLITE_BUSY / SQLITE_LOCKED surface as database errors
                let msg = db.message().to_ascii_lowercase();
                msg.contains("locked") || msg.contains("busy")
            }
            _ => false,
        }
    }

    /// Whether the error should abort process startup.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            TipsterError::Config(_) | TipsterError::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(TipsterError::Transient("timeout".into()).is_retryable());
        assert!(TipsterError::RateLimited("429".into()).is_retryable());
    }

    #[test]
    fn venue_business_errors_are_not_retryable() {
        let err = TipsterError::Venue {
            errno: 10403,
            message: "Invalid area".into(),
        };
        assert!(!err.is_retryable());
        assert!(!TipsterError::Schema("bad probability".into()).is_retryable());
    }
}
