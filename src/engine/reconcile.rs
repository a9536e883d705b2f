//! Reconciliation against the venue's authoritative state.
//!
//! Three sweeps, each idempotent: fills promote SUBMITTED bets to FILLED;
//! resolutions settle FILLED bets into the portfolio (one transaction per
//! bet); won bets get an on-chain redemption request, deferred while the
//! custody wallet is short on gas. A final balance-drift check compares the
//! venue's quote balance with the summed local portfolios.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::domain::MarketStatus;
use crate::error::Result;
use crate::store::Store;
use crate::venue::{RedeemOutcome, VenueClient};

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub fills_applied: usize,
    pub resolutions_applied: usize,
    pub orders_voided: usize,
    pub redemptions_submitted: usize,
    pub redemptions_deferred: usize,
    pub drift_warnings: Vec<String>,
    pub errors: usize,
}

pub struct Reconciler<'a> {
    store: &'a Store,
    venue: &'a dyn VenueClient,
    fee_rate: Decimal,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store, venue: &'a dyn VenueClient, fee_rate: Decimal) -> Self {
        Self {
            store,
            venue,
            fee_rate,
        }
    }

    pub async fn run(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        self.apply_fills(&mut report).await?;
        self.apply_resolutions(&mut report).await?;
        self.redeem_wins(&mut report).await?;
        self.check_balance_drift(&mut report).await;

        info!(
            "reconciliation complete: fills={} resolutions={} voided={} redeemed={} deferred={} errors={}",
            report.fills_applied,
            report.resolutions_applied,
            report.orders_voided,
            report.redemptions_submitted,
            report.redemptions_deferred,
            report.errors
        );
        Ok(report)
    }

    async fn apply_fills(&self, report: &mut ReconcileReport) -> Result<()> {
        let open = self.store.open_bets().await?;
        if open.is_empty() {
            return Ok(());
        }

        let trades = self.venue.get_my_trades(200).await?;
        let filled_orders: HashSet<&str> = trades.iter().map(|t| t.order_id.as_str()).collect();

        for bet in open {
            let Some(order_id) = bet.order_id.as_deref() else {
                continue;
            };
            if !filled_orders.contains(order_id) {
                continue;
            }
            let Some(bet_id) = bet.id else {
                continue;
            };
            self.store
                .tx(move |tx| Box::pin(async move { tx.mark_bet_filled(bet_id).await.map(|_| ()) }))
                .await?;
            report.fills_applied += 1;
        }
        Ok(())
    }

    async fn apply_resolutions(&self, report: &mut ReconcileReport) -> Result<()> {
        // settle filled bets on resolved markets
        for bet in self.store.unresolved_filled_bets().await? {
            let Some(detail) = self.venue.get_market(bet.market_id).await? else {
                continue;
            };
            if MarketStatus::from_raw(&detail.status) != Some(MarketStatus::Resolved) {
                continue;
            }
            let Some(winner) = detail.winner_token_id else {
                warn!("market {} resolved without a winner token", bet.market_id);
                continue;
            };

            let won = winner == bet.token_id;
            // payout s/c is fee-charged at win time; a loss burns the stake
            let profit_loss = if won {
                let payout = bet.size / bet.limit_price;
                (payout * (Decimal::ONE - self.fee_rate) - bet.size).round_dp(2)
            } else {
                -bet.size
            };

            let Some(bet_id) = bet.id else {
                continue;
            };
            let firm = bet.firm.clone();
            let size = bet.size;
            let today = Utc::now().date_naive();
            self.store
                .tx(move |tx| {
                    Box::pin(async move {
                        tx.resolve_bet(bet_id, won, profit_loss).await?;

                        let mut portfolio =
                            tx.get_portfolio_for_update(&firm).await?.ok_or_else(|| {
                                crate::error::TipsterError::Integrity(format!(
                                    "no portfolio for firm {firm}"
                                ))
                            })?;
                        portfolio.apply_result(profit_loss, won, Utc::now());
                        tx.save_portfolio(&portfolio).await?;

                        if !won {
                            let mut counter = tx.daily_counter(&firm, today).await?;
                            counter.realized_loss += size;
                            tx.save_daily_counter(&counter).await?;
                        }
                        Ok(())
                    })
                })
                .await?;

            info!(
                "resolved bet {} ({}): {} pnl {}",
                bet_id,
                bet.firm,
                if won { "won" } else { "lost" },
                profit_loss
            );
            report.resolutions_applied += 1;
        }

        // void still-unfilled orders whose market already resolved
        for bet in self.store.open_bets().await? {
            let Some(detail) = self.venue.get_market(bet.market_id).await? else {
                continue;
            };
            if MarketStatus::from_raw(&detail.status) != Some(MarketStatus::Resolved) {
                continue;
            }
            let Some(bet_id) = bet.id else {
                continue;
            };
            self.store
                .tx(move |tx| {
                    Box::pin(async move { tx.mark_bet_cancelled(bet_id).await.map(|_| ()) })
                })
                .await?;
            report.orders_voided += 1;
        }
        Ok(())
    }

    async fn redeem_wins(&self, report: &mut ReconcileReport) -> Result<()> {
        for bet in self.store.unredeemed_wins().await? {
            let Some(bet_id) = bet.id else {
                continue;
            };
            match self.venue.redeem(bet.market_id).await {
                Ok(RedeemOutcome::Submitted { tx_hash }) => {
                    self.store
                        .tx(move |tx| {
                            Box::pin(
                                async move { tx.mark_bet_redeemed(bet_id, Utc::now()).await },
                            )
                        })
                        .await?;
                    info!(
                        "redeemed winnings for bet {} (tx: {})",
                        bet_id,
                        tx_hash.as_deref().unwrap_or("pending")
                    );
                    report.redemptions_submitted += 1;
                }
                Ok(RedeemOutcome::DeferredLowGas) => {
                    // low gas on the custody wallet is a warning, not a
                    // failure; retried next cycle
                    warn!("redemption deferred for bet {} (low gas)", bet_id);
                    report.redemptions_deferred += 1;
                }
                Err(err) => {
                    warn!("redemption failed for bet {}: {}", bet_id, err);
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn check_balance_drift(&self, report: &mut ReconcileReport) {
        let venue_balance = match self.venue.get_my_balances().await {
            Ok(snapshot) => snapshot.total,
            Err(err) => {
                warn!("balance drift check skipped: {}", err);
                report.errors += 1;
                return;
            }
        };
        let portfolios = match self.store.list_portfolios().await {
            Ok(portfolios) => portfolios,
            Err(err) => {
                warn!("balance drift check skipped: {}", err);
                report.errors += 1;
                return;
            }
        };

        let local_total: Decimal = portfolios.iter().map(|p| p.balance).sum();
        let drift = venue_balance - local_total;
        if drift.abs() <= dec!(0.01) {
            return;
        }

        let pct = if local_total > Decimal::ZERO {
            (drift.abs() / local_total * dec!(100)).round_dp(1)
        } else {
            Decimal::ZERO
        };
        let message = format!(
            "venue balance {venue_balance} vs local total {local_total} (drift {drift}, {pct}%)"
        );
        if drift.abs() > dec!(5) || pct > dec!(10) {
            warn!("CRITICAL balance drift: {}", message);
        } else {
            warn!("balance drift: {}", message);
        }
        report.drift_warnings.push(message);
    }
}
