//! Daily cycle orchestrator.
//!
//! One cycle: open a cycle record, clear the per-cycle cache, fetch and
//! filter tradable markets, then walk the firms **sequentially** (a resource
//! contract: five concurrent firms each holding collector output and model
//! I/O blew past the worker memory ceiling) and for each firm the markets in
//! a stable order. Every evaluated pair persists a Prediction row whether or
//! not a bet follows. On deadline, the in-flight pair finishes, the rest is
//! abandoned, and the record closes as PARTIAL. Reconciliation runs at the
//! end.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::domain::{
    Bet, CycleRecord, CycleStatus, Firm, Market, MarketCategory, MarketStatus, Prediction,
};
use crate::error::{Result, TipsterError};
use crate::retry::{self, RetryPolicy};

use super::ev::{self, clamp_order_price};
use super::reconcile::Reconciler;
use super::risk::{GateDecision, GateInputs, RiskGuard};
use super::sizing::{desired_size, SizeOutcome, SizingInputs};
use super::submit;

pub struct CycleRunner {
    ctx: Arc<AppContext>,
}

#[derive(Debug)]
enum PairAction {
    Submitted,
    Failed,
    Skipped,
}

impl CycleRunner {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self) -> Result<CycleRecord> {
        if !self.ctx.config.system_enabled {
            return Err(TipsterError::Validation(
                "SYSTEM_ENABLED is false; refusing to run a cycle".into(),
            ));
        }

        let started_at = Utc::now();
        let mut record = CycleRecord::started(started_at);
        let open_record = record.clone();
        let cycle_id = self
            .ctx
            .store
            .tx(move |tx| Box::pin(async move { tx.open_cycle(&open_record).await }))
            .await?;

        self.ctx.cache.clear().await;

        let deadline = Instant::now() + Duration::from_secs(self.ctx.config.cycle.deadline_secs);

        let markets = match self.fetch_tradable_markets(&mut record).await {
            Ok(markets) => markets,
            Err(err) => {
                // the page walk failing is fatal for the whole cycle
                error!("market fetch failed, aborting cycle: {}", err);
                record.status = CycleStatus::Failed;
                record.finished_at = Some(Utc::now());
                let close = record.clone();
                self.ctx
                    .store
                    .tx(move |tx| Box::pin(async move { tx.close_cycle(cycle_id, &close).await }))
                    .await?;
                return Err(err);
            }
        };

        record.markets_tradable = markets.len() as i64;
        for market in &markets {
            *record
                .per_category_counts
                .entry(market.category.as_str().to_string())
                .or_insert(0) += 1;
        }
        info!(
            "cycle {}: {} markets fetched, {} tradable",
            cycle_id, record.markets_fetched, record.markets_tradable
        );

        let firms = self.ctx.firms.clone();
        let total = firms.len();
        let mut deadline_hit = false;

        'firms: for (index, firm) in firms.iter().enumerate() {
            if Instant::now() >= deadline {
                deadline_hit = true;
                break;
            }
            info!("[{}/{}] processing firm {}", index + 1, total, firm.name);

            let per_firm_cap = self.ctx.config.cycle.max_markets_per_firm;
            for market in markets.iter().take(per_firm_cap) {
                if Instant::now() >= deadline {
                    deadline_hit = true;
                    warn!(
                        "cycle deadline reached during firm {}; remaining work abandoned",
                        firm.name
                    );
                    break 'firms;
                }

                match self.process_pair(firm, market).await {
                    Ok(PairAction::Submitted) => {
                        record.bets_approved += 1;
                        record.bets_executed += 1;
                    }
                    Ok(PairAction::Failed) => {
                        record.bets_approved += 1;
                        record.bets_failed += 1;
                    }
                    Ok(PairAction::Skipped) => {}
                    Err(err) => {
                        // one pair's failure never stops the cycle
                        warn!(
                            "pair ({}, market {}) aborted: {}",
                            firm.name, market.market_id, err
                        );
                    }
                }
            }
        }

        if let Err(err) = Reconciler::new(
            &self.ctx.store,
            self.ctx.venue.as_ref(),
            self.ctx.config.venue.fee_rate,
        )
        .run()
        .await
        {
            warn!("reconciliation failed: {}", err);
        }

        record.status = if deadline_hit {
            CycleStatus::Partial
        } else {
            CycleStatus::Completed
        };
        record.finished_at = Some(Utc::now());
        let close = record.clone();
        self.ctx
            .store
            .tx(move |tx| Box::pin(async move { tx.close_cycle(cycle_id, &close).await }))
            .await?;

        record.id = Some(cycle_id);
        info!(
            "cycle {} {}: approved={} executed={} failed={}",
            cycle_id,
            record.status,
            record.bets_approved,
            record.bets_executed,
            record.bets_failed
        );
        Ok(record)
    }

    /// Page through the venue listing, then per-candidate: detail fetch for
    /// token IDs, token checks *before* the orderbook probe, category and
    /// liquidity filters. Every rejection logs a structured reason tag.
    async fn fetch_tradable_markets(&self, record: &mut CycleRecord) -> Result<Vec<Market>> {
        let venue = self.ctx.venue.clone();
        let page_size = self.ctx.config.venue.page_size;
        let cap = self.ctx.config.venue.market_cap as usize;

        let mut summaries = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = retry::with_backoff(
                RetryPolicy::venue(),
                "market listing",
                retry::retry_transient,
                || venue.get_markets(page_size, offset),
            )
            .await?;
            let page_len = page.len();
            summaries.extend(page);
            offset += page_size;
            if page_len < page_size as usize || summaries.len() >= cap {
                break;
            }
        }
        summaries.truncate(cap);
        record.markets_fetched = summaries.len() as i64;

        let mut tradable = Vec::new();
        for summary in summaries {
            // the API hands back every status; filter locally
            if MarketStatus::from_raw(&summary.status) != Some(MarketStatus::Activated) {
                info!(
                    market_id = summary.market_id,
                    reason = "not_activated",
                    status = %summary.status,
                    "market rejected"
                );
                continue;
            }

            // detail fetch populates token IDs; 404 means the listing led
            // the detail endpoint and the market is silently skipped
            let detail = match venue.get_market(summary.market_id).await {
                Ok(Some(detail)) => detail,
                Ok(None) => continue,
                Err(err) => {
                    warn!("detail fetch for market {} failed: {}", summary.market_id, err);
                    continue;
                }
            };

            let mut market = Market {
                market_id: detail.market_id,
                title: detail.title,
                category: MarketCategory::parse_loose(&detail.category),
                status: MarketStatus::from_raw(&detail.status)
                    .unwrap_or(MarketStatus::Activated),
                yes_token_id: detail.yes_token_id,
                no_token_id: detail.no_token_id,
                ask_price: None,
                bid_price: None,
                volume: summary.volume,
                resolution_time: detail.resolution_time,
                has_liquidity: false,
            };

            // tokens must exist before we spend an orderbook call
            market.has_liquidity = true;
            if let Err(reason) = market.check_tradable() {
                info!(market_id = market.market_id, reason = %reason, "market rejected");
                continue;
            }

            let yes_token = market.yes_token_id.clone().unwrap_or_default();
            match venue.get_orderbook(&yes_token).await {
                Ok(book) => {
                    market.ask_price = book.ask;
                    market.bid_price = book.bid;
                    market.has_liquidity = book.has_liquidity();
                }
                Err(err) => {
                    warn!("orderbook for market {} failed: {}", market.market_id, err);
                    market.has_liquidity = false;
                }
            }

            if let Err(reason) = market.check_tradable() {
                info!(market_id = market.market_id, reason = %reason, "market rejected");
                continue;
            }
            tradable.push(market);
        }

        // stable order for reproducible runs
        tradable.sort_by_key(|m| m.market_id);
        Ok(tradable)
    }

    /// Analyse, validate, size, gate, and submit for one (firm, market)
    /// pair. The Prediction row persists no matter which branch exits.
    async fn process_pair(&self, firm: &Firm, market: &Market) -> Result<PairAction> {
        let store = &self.ctx.store;
        let today = Utc::now().date_naive();

        // a completed cycle re-run must not double-book the same day
        let firm_name = firm.name.clone();
        let market_id = market.market_id;
        let already = store
            .tx(move |tx| {
                Box::pin(async move {
                    tx.prediction_exists_for_day(&firm_name, market_id, today)
                        .await
                })
            })
            .await?;
        if already {
            info!(
                "skip ({}, market {}): already_evaluated_today",
                firm.name, market.market_id
            );
            return Ok(PairAction::Skipped);
        }

        // model decision
        let input = self.ctx.assembler.assemble(firm, market).await;
        let decision = match self.ctx.models.get(&firm.name) {
            Ok(client) => client.predict(&input.prompt).await,
            Err(err) => Err(err),
        };

        let mut prediction = match decision {
            Ok(blob) => match crate::analysis::validate_decision(
                &firm.name,
                market.market_id,
                &blob,
                Utc::now(),
            ) {
                Ok(prediction) => prediction,
                Err(err) => {
                    warn!(
                        "skip ({}, market {}): schema_error: {}",
                        firm.name, market.market_id, err
                    );
                    let placeholder = Prediction::unusable(
                        &firm.name,
                        market.market_id,
                        &format!("schema_error: {err}"),
                        Utc::now(),
                    );
                    self.persist_prediction(placeholder).await?;
                    return Ok(PairAction::Skipped);
                }
            },
            Err(err) => {
                warn!(
                    "skip ({}, market {}): model_error: {}",
                    firm.name, market.market_id, err
                );
                let placeholder = Prediction::unusable(
                    &firm.name,
                    market.market_id,
                    &format!("model_error: {err}"),
                    Utc::now(),
                );
                self.persist_prediction(placeholder).await?;
                return Ok(PairAction::Skipped);
            }
        };

        // persist the prediction first; skip reasons update the row in place
        let prediction_id = self.persist_prediction(prediction.clone()).await?;
        prediction.id = Some(prediction_id);

        // expected value at the actual entry price
        let fee_rate = self.ctx.config.venue.fee_rate;
        let entry = match ev::select_entry(
            self.ctx.venue.as_ref(),
            market,
            prediction.probability,
            fee_rate,
        )
        .await
        {
            Ok(entry) => entry,
            Err(err) => {
                return self
                    .skip(prediction_id, firm, market, &format!("no_entry_price: {err}"))
                    .await;
            }
        };
        if entry.unit_ev <= Decimal::ZERO {
            return self
                .skip(prediction_id, firm, market, "non_positive_ev")
                .await;
        }

        // sizing under the firm's strategy
        let portfolio = match store.get_portfolio(&firm.name).await? {
            Some(portfolio) => portfolio,
            None => {
                return self
                    .skip(prediction_id, firm, market, "portfolio_missing")
                    .await;
            }
        };
        let sized = desired_size(
            &self.ctx.config.sizing,
            &SizingInputs {
                strategy: firm.strategy,
                win_probability: entry.win_probability,
                entry_price: entry.entry_price,
                confidence: prediction.confidence,
                portfolio: &portfolio,
            },
        );
        let desired = match sized {
            SizeOutcome::Stake(size) => size,
            SizeOutcome::Skip(reason) => {
                return self.skip(prediction_id, firm, market, reason).await;
            }
        };

        // risk gate
        let counter = {
            let firm_name = firm.name.clone();
            store
                .tx(move |tx| {
                    Box::pin(async move { tx.daily_counter(&firm_name, today).await })
                })
                .await?
        };
        let open_positions = store.open_positions(&firm.name).await?;
        let category_exposure = store
            .open_category_exposure(&firm.name, market.category)
            .await?;
        let guard = RiskGuard::new(
            self.ctx.config.risk.clone(),
            self.ctx.config.bankroll.daily_spend_cap(),
        );
        let decision = guard.gate(&GateInputs {
            portfolio: &portfolio,
            counter: &counter,
            desired_size: desired,
            open_positions: open_positions.len() as i64,
            open_exposure: open_positions.iter().map(|b| b.size).sum(),
            category_exposure,
        });

        let (size, tier) = match decision {
            GateDecision::Approved { size, tier } => (size, tier),
            GateDecision::Vetoed { tier, reason } => {
                info!(
                    "veto ({}, market {}): {} (tier {})",
                    firm.name, market.market_id, reason, tier
                );
                return self.skip(prediction_id, firm, market, reason.as_str()).await;
            }
        };

        // submit
        let expected_value = ev::net_expected_value(
            entry.win_probability,
            entry.entry_price,
            size,
            fee_rate,
        );
        let bet = Bet::approved(
            prediction_id,
            &firm.name,
            market.market_id,
            &entry.token_id,
            entry.side,
            size,
            clamp_order_price(entry.entry_price),
            expected_value.round_dp(2),
            Utc::now(),
        );
        info!(
            "approved ({}, market {}): {} {} @ {} (tier {}, ev {})",
            firm.name,
            market.market_id,
            entry.side.as_str(),
            size,
            entry.entry_price,
            tier,
            expected_value.round_dp(4)
        );

        let submitted = submit::submit_bet(
            store,
            self.ctx.venue.as_ref(),
            bet,
            market.category,
        )
        .await?;

        match submitted.status {
            crate::domain::BetStatus::Submitted => Ok(PairAction::Submitted),
            _ => Ok(PairAction::Failed),
        }
    }

    async fn persist_prediction(&self, prediction: Prediction) -> Result<i64> {
        self.ctx
            .store
            .tx(move |tx| Box::pin(async move { tx.insert_prediction(&prediction).await }))
            .await
    }

    async fn skip(
        &self,
        prediction_id: i64,
        firm: &Firm,
        market: &Market,
        reason: &str,
    ) -> Result<PairAction> {
        info!("skip ({}, market {}): {}", firm.name, market.market_id, reason);
        let reason = reason.to_string();
        self.ctx
            .store
            .tx(move |tx| {
                Box::pin(async move {
                    tx.set_prediction_skip_reason(prediction_id, &reason).await
                })
            })
            .await?;
        Ok(PairAction::Skipped)
    }
}

/// Ensure the five portfolios exist; returns how many were created.
pub async fn initialize_portfolios(ctx: &AppContext) -> Result<usize> {
    let initial = ctx.config.bankroll.initial_balance();
    let firms: Vec<String> = ctx.firms.iter().map(|f| f.name.clone()).collect();
    ctx.store
        .tx(move |tx| {
            Box::pin(async move {
                let mut created = 0usize;
                for firm in &firms {
                    if tx
                        .insert_portfolio_if_absent(firm, initial, Utc::now())
                        .await?
                    {
                        created += 1;
                    }
                }
                Ok(created)
            })
        })
        .await
}
