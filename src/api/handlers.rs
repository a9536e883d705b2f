use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::error;

use super::auth::{ensure_admin_authorized, ensure_monitor_authorized};
use super::state::ApiState;
use crate::engine::cycle::initialize_portfolios;
use crate::engine::learning::{self, FirmStanding};
use crate::engine::monitor::{FirmReviser, OrderMonitor};
use crate::engine::{CycleRunner, RiskTier};
use crate::error::TipsterError;

type ApiError = (StatusCode, String);

fn internal(err: TipsterError) -> ApiError {
    error!("request failed: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn f64_or_zero(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// GET /health — store reachability and configured-key flags. Never the key
/// values themselves.
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let store_ok = state.ctx.store.ping().await.is_ok();
    let keys: serde_json::Map<String, serde_json::Value> = state
        .ctx
        .config
        .models
        .configured_flags()
        .into_iter()
        .map(|(name, configured)| (name.to_string(), json!(configured)))
        .collect();

    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if store_ok { "healthy" } else { "unhealthy" },
            "store_reachable": store_ok,
            "venue_key_configured": !state.ctx.config.venue.api_key.is_empty(),
            "model_keys_configured": keys,
            "system_enabled": state.ctx.config.system_enabled,
            "uptime_seconds": state.uptime_seconds(),
            "timestamp": Utc::now(),
        })),
    )
}

/// POST /admin/run-cycle — run one full cycle synchronously.
pub async fn run_cycle(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    ensure_admin_authorized(&headers, &state.ctx.config.server.admin_token)?;

    let runner = CycleRunner::new(state.ctx.clone());
    match runner.run().await {
        Ok(record) => Ok(Json(json!({
            "success": true,
            "status": record.status.as_str(),
            "markets_fetched": record.markets_fetched,
            "markets_tradable": record.markets_tradable,
            "bets_approved": record.bets_approved,
            "bets_executed": record.bets_executed,
            "bets_failed": record.bets_failed,
            "per_category": record.per_category_counts,
        }))),
        // a partial cycle is a summary, not an error
        Err(TipsterError::DeadlineExceeded(detail)) => Ok(Json(json!({
            "success": true,
            "status": "PARTIAL",
            "detail": detail,
        }))),
        Err(TipsterError::Validation(detail)) => Ok(Json(json!({
            "success": false,
            "detail": detail,
        }))),
        Err(err) => Err(internal(err)),
    }
}

/// POST /admin/monitor-orders — one monitor pass; requires the shared secret.
pub async fn monitor_orders(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    ensure_monitor_authorized(&headers, &state.ctx.config.server.monitor_secret)?;

    let ctx = &state.ctx;
    let reviser = FirmReviser {
        venue: ctx.venue.clone(),
        assembler: ctx.assembler.clone(),
        models: ctx.models.clone(),
        firms: ctx.firms.clone(),
    };
    let monitor = OrderMonitor::new(
        ctx.store.clone(),
        ctx.venue.clone(),
        Some(std::sync::Arc::new(reviser)),
        ctx.config.monitor.clone(),
    );

    let report = monitor.run_pass(Utc::now()).await.map_err(internal)?;
    Ok(Json(json!({
        "success": true,
        "reviewed": report.reviewed,
        "strikes_issued": report.strikes_issued,
        "resets": report.resets,
        "cancelled": report.cancelled,
        "skipped_recent": report.skipped_recent,
        "errors": report.errors,
    })))
}

/// POST /admin/initialize-portfolios — create the five portfolios if absent.
pub async fn init_portfolios(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    ensure_admin_authorized(&headers, &state.ctx.config.server.admin_token)?;

    let created = initialize_portfolios(&state.ctx).await.map_err(internal)?;
    Ok(Json(json!({
        "success": true,
        "created": created,
        "initial_balance": f64_or_zero(state.ctx.config.bankroll.initial_balance()),
    })))
}

/// GET /api/leaderboard — firms ranked by account value.
pub async fn leaderboard(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = &state.ctx;
    let mut rows = Vec::new();
    for firm in &ctx.firms {
        let Some(portfolio) = ctx.store.get_portfolio(&firm.name).await.map_err(internal)? else {
            continue;
        };
        let stats = ctx.store.firm_bet_stats(&firm.name).await.map_err(internal)?;
        let resolved = stats.wins + stats.losses;
        let win_rate = if resolved > 0 {
            stats.wins as f64 / resolved as f64 * 100.0
        } else {
            0.0
        };
        let roi = if portfolio.initial_balance > Decimal::ZERO {
            f64_or_zero(
                (portfolio.balance - portfolio.initial_balance) / portfolio.initial_balance
                    * Decimal::ONE_HUNDRED,
            )
        } else {
            0.0
        };
        rows.push(json!({
            "rank": 0,
            "firm": firm.name,
            "model": firm.model_id,
            "color": firm.color_tag,
            "strategy": firm.strategy.as_str(),
            "account_value": f64_or_zero(portfolio.balance),
            "profit_loss": f64_or_zero(stats.profit),
            "total_bets": stats.total_bets,
            "wins": stats.wins,
            "losses": stats.losses,
            "win_rate": win_rate,
            "roi": roi,
            "tier": RiskTier::classify(portfolio.balance, portfolio.initial_balance).as_str(),
        }));
    }

    rows.sort_by(|a, b| {
        let value = |v: &serde_json::Value| v["account_value"].as_f64().unwrap_or(0.0);
        value(b).partial_cmp(&value(a)).unwrap_or(std::cmp::Ordering::Equal)
    });
    for (index, row) in rows.iter_mut().enumerate() {
        row["rank"] = json!(index + 1);
    }
    Ok(Json(rows))
}

/// GET /api/live-metrics — compact per-firm figures for dashboards.
pub async fn live_metrics(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = &state.ctx;
    let mut rows = Vec::new();
    for firm in &ctx.firms {
        let portfolio = ctx.store.get_portfolio(&firm.name).await.map_err(internal)?;
        let stats = ctx.store.firm_bet_stats(&firm.name).await.map_err(internal)?;
        let (balance, streaks) = match &portfolio {
            Some(p) => (
                f64_or_zero(p.balance),
                json!({"wins": p.consecutive_wins, "losses": p.consecutive_losses}),
            ),
            None => (0.0, json!({"wins": 0, "losses": 0})),
        };
        rows.push(json!({
            "firm": firm.name,
            "color": firm.color_tag,
            "total_value": balance,
            "profit_loss": f64_or_zero(stats.profit),
            "total_bets": stats.total_bets,
            "streaks": streaks,
        }));
    }
    Ok(Json(rows))
}

/// GET /api/active-positions — open bets across all firms.
pub async fn active_positions(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = &state.ctx;
    let mut rows = Vec::new();
    for firm in &ctx.firms {
        for bet in ctx.store.open_positions(&firm.name).await.map_err(internal)? {
            rows.push(json!({
                "firm": bet.firm,
                "market_id": bet.market_id,
                "token_id": bet.token_id,
                "side": bet.market_side.as_str(),
                "size": f64_or_zero(bet.size),
                "limit_price": f64_or_zero(bet.limit_price),
                "status": bet.status.as_str(),
                "order_id": bet.order_id,
                "submitted_at": bet.submitted_at,
                "consecutive_strikes": bet.consecutive_strikes,
            }));
        }
    }
    Ok(Json(rows))
}

/// GET /api/ai-decisions-history — recent predictions with skip rationale.
pub async fn decisions_history(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let predictions = state
        .ctx
        .store
        .recent_predictions(None, 100)
        .await
        .map_err(internal)?;
    let rows: Vec<_> = predictions
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "firm": p.firm,
                "market_id": p.market_id,
                "probability": f64_or_zero(p.probability),
                "confidence": f64_or_zero(p.confidence),
                "scores": {
                    "sentiment": f64_or_zero(p.scores.sentiment),
                    "news": f64_or_zero(p.scores.news),
                    "technical": f64_or_zero(p.scores.technical),
                    "fundamental": f64_or_zero(p.scores.fundamental),
                    "volatility": f64_or_zero(p.scores.volatility),
                },
                "reasoning": p.probability_reasoning,
                "skip_reason": p.skip_reason,
                "created_at": p.created_at,
            })
        })
        .collect();
    Ok(Json(rows))
}

/// GET /api/cancelled-orders — monitor cancellations with strike trails.
pub async fn cancelled_orders(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let cancelled = state.ctx.store.cancelled_orders(50).await.map_err(internal)?;
    let rows: Vec<_> = cancelled
        .iter()
        .map(|c| {
            json!({
                "order_id": c.order_id,
                "firm": c.firm,
                "market_id": c.market_id,
                "cancel_reason": c.cancel_reason,
                "cancelled_at": c.cancelled_at,
                "strikes": c.strikes_history.len(),
                "strikes_history": c.strikes_history,
            })
        })
        .collect();
    Ok(Json(rows))
}

/// GET /api/learning-insights — rolling 7-day performance review per firm.
pub async fn learning_insights(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = &state.ctx;
    let cutoff = learning::review_cutoff(Utc::now());

    let mut reviews = Vec::new();
    for firm in &ctx.firms {
        let outcomes = ctx
            .store
            .bet_outcomes_since(&firm.name, cutoff)
            .await
            .map_err(internal)?;
        reviews.push(learning::weekly_review(&firm.name, &outcomes));
    }
    Ok(Json(reviews))
}

/// GET /api/firm-recommendation — which firm historical performance favours.
pub async fn firm_recommendation(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = &state.ctx;

    let mut standings = Vec::new();
    for firm in &ctx.firms {
        let stats = ctx.store.firm_bet_stats(&firm.name).await.map_err(internal)?;
        let roi_pct = match ctx.store.get_portfolio(&firm.name).await.map_err(internal)? {
            Some(portfolio) if portfolio.initial_balance > Decimal::ZERO => {
                (portfolio.balance - portfolio.initial_balance) / portfolio.initial_balance
                    * Decimal::ONE_HUNDRED
            }
            _ => Decimal::ZERO,
        };
        standings.push(FirmStanding {
            firm: firm.name.clone(),
            total_bets: stats.total_bets,
            resolved: stats.wins + stats.losses,
            wins: stats.wins,
            profit: stats.profit,
            roi_pct,
        });
    }
    Ok(Json(learning::recommend_firm(&standings)))
}

/// GET /api/recent-trades — latest bets across firms.
pub async fn recent_trades(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    trades_response(&state, None).await
}

/// GET /api/ai-trades/{firm} — one firm's bet history.
pub async fn firm_trades(
    State(state): State<ApiState>,
    Path(firm): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.ctx.firms.iter().any(|f| f.name == firm) {
        return Err((StatusCode::NOT_FOUND, format!("unknown firm {firm}")));
    }
    trades_response(&state, Some(firm)).await
}

async fn trades_response(
    state: &ApiState,
    firm: Option<String>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let bets = state
        .ctx
        .store
        .recent_bets(firm.as_deref(), 50)
        .await
        .map_err(internal)?;
    let rows: Vec<_> = bets
        .iter()
        .map(|b| {
            json!({
                "id": b.id,
                "firm": b.firm,
                "market_id": b.market_id,
                "side": b.market_side.as_str(),
                "size": f64_or_zero(b.size),
                "limit_price": f64_or_zero(b.limit_price),
                "status": b.status.as_str(),
                "expected_value": f64_or_zero(b.expected_value),
                "actual_result": b.actual_result,
                "profit_loss": b.profit_loss.map(f64_or_zero),
                "error": b.error,
                "created_at": b.created_at,
            })
        })
        .collect();
    Ok(Json(rows))
}
