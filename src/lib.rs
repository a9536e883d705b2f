pub mod analysis;
pub mod api;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod context;
pub mod domain;
pub mod engine;
pub mod error;
pub mod models;
pub mod retry;
pub mod store;
pub mod venue;

pub use config::AppConfig;
pub use context::AppContext;
pub use engine::{CycleRunner, OrderMonitor, Reconciler, RiskGuard, RiskTier};
pub use error::{Result, TipsterError};
pub use store::Store;
