pub mod cycle;
pub mod ev;
pub mod learning;
pub mod monitor;
pub mod reconcile;
pub mod risk;
pub mod sizing;
pub mod submit;

pub use cycle::CycleRunner;
pub use ev::{choose_side, clamp_order_price, unit_net_ev, EntrySelection};
pub use learning::{recommend_firm, weekly_review, FirmRecommendation, WeeklyReview};
pub use monitor::{OrderMonitor, MonitorReport};
pub use reconcile::{ReconcileReport, Reconciler};
pub use risk::{GateDecision, GateInputs, GateVeto, RiskGuard, RiskTier};
pub use sizing::{desired_size, SizeOutcome};
