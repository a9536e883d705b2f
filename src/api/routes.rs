use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::{handlers, state::ApiState};

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Liveness & configuration flags
        .route("/health", get(handlers::health))
        // Admin surface
        .route("/admin/run-cycle", post(handlers::run_cycle))
        .route("/admin/monitor-orders", post(handlers::monitor_orders))
        .route(
            "/admin/initialize-portfolios",
            post(handlers::init_portfolios),
        )
        // Read-only views over the store
        .route("/api/leaderboard", get(handlers::leaderboard))
        .route("/api/live-metrics", get(handlers::live_metrics))
        .route("/api/active-positions", get(handlers::active_positions))
        .route(
            "/api/ai-decisions-history",
            get(handlers::decisions_history),
        )
        .route("/api/cancelled-orders", get(handlers::cancelled_orders))
        .route("/api/learning-insights", get(handlers::learning_insights))
        .route(
            "/api/firm-recommendation",
            get(handlers::firm_recommendation),
        )
        .route("/api/recent-trades", get(handlers::recent_trades))
        .route("/api/ai-trades/:firm", get(handlers::firm_trades))
        .with_state(state)
        .layer(cors)
}
