//! 4-tier adaptive risk guard.
//!
//! The tier is derived from the firm's bankroll relative to its initial
//! balance; thresholds are inclusive on the lower side. The guard runs after
//! sizing: it may reduce a candidate stake to the tier's per-bet cap or veto
//! it outright. In the Conservative tier the 1.50 floor outranks the normal
//! per-bet percentage cap; in degraded tiers a reduction below the floor is
//! a veto, and the floor never outranks available balance.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::config::RiskSettings;
use crate::domain::{DailyCounter, Portfolio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Conservative,
    Defensive,
    Recovery,
    Emergency,
    Suspended,
}

impl RiskTier {
    /// Inclusive lower bounds: a balance exactly at 0.70x initial is
    /// Defensive, not Recovery.
    pub fn classify(balance: Decimal, initial: Decimal) -> Self {
        if initial <= Decimal::ZERO || balance <= Decimal::ZERO {
            return Self::Suspended;
        }
        let ratio = balance / initial;
        if ratio >= dec!(0.85) {
            Self::Conservative
        } else if ratio >= dec!(0.70) {
            Self::Defensive
        } else if ratio >= dec!(0.60) {
            Self::Recovery
        } else if ratio >= dec!(0.50) {
            Self::Emergency
        } else {
            Self::Suspended
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Defensive => "defensive",
            Self::Recovery => "recovery",
            Self::Emergency => "emergency",
            Self::Suspended => "suspended",
        }
    }

    /// Per-bet cap as a fraction of current balance. None = no bets at all.
    pub fn max_bet_fraction(&self) -> Option<Decimal> {
        match self {
            Self::Conservative => Some(dec!(0.02)),
            Self::Defensive => Some(dec!(0.01)),
            Self::Recovery => Some(dec!(0.005)),
            Self::Emergency => Some(dec!(0.0025)),
            Self::Suspended => None,
        }
    }

    /// Daily realized-loss cap as a fraction of current balance.
    pub fn daily_loss_fraction(&self) -> Decimal {
        match self {
            Self::Conservative => dec!(0.10),
            Self::Defensive => dec!(0.07),
            Self::Recovery => dec!(0.05),
            Self::Emergency => dec!(0.03),
            Self::Suspended => Decimal::ZERO,
        }
    }

    pub fn max_open_positions(&self) -> i64 {
        match self {
            Self::Conservative => 5,
            Self::Defensive => 3,
            Self::Recovery => 2,
            Self::Emergency => 1,
            Self::Suspended => 0,
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Veto reasons, persisted verbatim as skip rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVeto {
    TierSuspended,
    DailyBetCountExceeded,
    DailySpendExceeded,
    DailyLossCapHit,
    MaxOpenPositions,
    CategoryExposureCap,
    InsufficientBalance,
    BelowMinimum,
    /// The tier cap shrank an otherwise-valid stake under the floor.
    BelowMinimumAfterTierCap,
}

impl GateVeto {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TierSuspended => "tier_suspended",
            Self::DailyBetCountExceeded => "daily_bet_count_exceeded",
            Self::DailySpendExceeded => "daily_spend_exceeded",
            Self::DailyLossCapHit => "daily_loss_cap_hit",
            Self::MaxOpenPositions => "max_open_positions",
            Self::CategoryExposureCap => "category_exposure_cap",
            Self::InsufficientBalance => "insufficient_balance",
            Self::BelowMinimum => "below_minimum",
            Self::BelowMinimumAfterTierCap => "below_minimum_after_tier_cap",
        }
    }
}

impl std::fmt::Display for GateVeto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum GateDecision {
    Approved { size: Decimal, tier: RiskTier },
    Vetoed { tier: RiskTier, reason: GateVeto },
}

impl GateDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, GateDecision::Approved { .. })
    }
}

pub struct GateInputs<'a> {
    pub portfolio: &'a Portfolio,
    pub counter: &'a DailyCounter,
    pub desired_size: Decimal,
    pub open_positions: i64,
    /// Stake currently locked in the firm's open bets.
    pub open_exposure: Decimal,
    /// Stake locked in open bets sharing the candidate's category.
    pub category_exposure: Decimal,
}

pub struct RiskGuard {
    settings: RiskSettings,
    daily_spend_cap: Option<Decimal>,
}

impl RiskGuard {
    pub fn new(settings: RiskSettings, daily_spend_cap: Option<Decimal>) -> Self {
        Self {
            settings,
            daily_spend_cap,
        }
    }

    pub fn gate(&self, inputs: &GateInputs<'_>) -> GateDecision {
        let portfolio = inputs.portfolio;
        let tier = RiskTier::classify(portfolio.balance, portfolio.initial_balance);

        let Some(tier_fraction) = tier.max_bet_fraction() else {
            return GateDecision::Vetoed {
                tier,
                reason: GateVeto::TierSuspended,
            };
        };

        if inputs.counter.bets_count >= self.settings.max_daily_bets {
            return GateDecision::Vetoed {
                tier,
                reason: GateVeto::DailyBetCountExceeded,
            };
        }

        let loss_cap = tier.daily_loss_fraction() * portfolio.balance;
        if inputs.counter.realized_loss >= loss_cap {
            return GateDecision::Vetoed {
                tier,
                reason: GateVeto::DailyLossCapHit,
            };
        }

        if inputs.open_positions >= tier.max_open_positions() {
            return GateDecision::Vetoed {
                tier,
                reason: GateVeto::MaxOpenPositions,
            };
        }

        // reduce to the tier's per-bet cap
        let tier_cap = (tier_fraction * portfolio.balance).round_dp(2);
        let mut size = inputs.desired_size.min(tier_cap);
        let reduced_by_tier = size < inputs.desired_size;

        let available = (portfolio.balance - inputs.open_exposure).max(Decimal::ZERO);

        if size < self.settings.min_bet {
            // the floor outranks the normal per-bet percentage cap, but only
            // while the firm is healthy; a degraded tier's cap is hard
            if tier == RiskTier::Conservative && self.settings.min_bet <= available {
                size = self.settings.min_bet;
            } else {
                return GateDecision::Vetoed {
                    tier,
                    reason: if reduced_by_tier {
                        GateVeto::BelowMinimumAfterTierCap
                    } else {
                        GateVeto::BelowMinimum
                    },
                };
            }
        }

        if size > available {
            return GateDecision::Vetoed {
                tier,
                reason: GateVeto::InsufficientBalance,
            };
        }

        if let Some(cap) = self.daily_spend_cap {
            if inputs.counter.spent + size > cap {
                return GateDecision::Vetoed {
                    tier,
                    reason: GateVeto::DailySpendExceeded,
                };
            }
        }

        let category_cap = self.settings.category_exposure_fraction * portfolio.balance;
        if inputs.category_exposure + size > category_cap {
            return GateDecision::Vetoed {
                tier,
                reason: GateVeto::CategoryExposureCap,
            };
        }

        GateDecision::Approved {
            size: size.round_dp(2),
            tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn portfolio(balance: Decimal, initial: Decimal) -> Portfolio {
        let mut p = Portfolio::new("test", initial, Utc::now());
        p.balance = balance;
        p
    }

    fn counter() -> DailyCounter {
        DailyCounter::fresh("test", Utc::now().date_naive())
    }

    fn guard() -> RiskGuard {
        RiskGuard::new(RiskSettings::default(), Some(dec!(5)))
    }

    fn gate(guard: &RiskGuard, portfolio: &Portfolio, counter: &DailyCounter, desired: Decimal) -> GateDecision {
        guard.gate(&GateInputs {
            portfolio,
            counter,
            desired_size: desired,
            open_positions: 0,
            open_exposure: Decimal::ZERO,
            category_exposure: Decimal::ZERO,
        })
    }

    #[test]
    fn tier_thresholds_are_inclusive_on_the_lower_side() {
        let initial = dec!(100);
        assert_eq!(RiskTier::classify(dec!(85), initial), RiskTier::Conservative);
        assert_eq!(RiskTier::classify(dec!(84.99), initial), RiskTier::Defensive);
        assert_eq!(RiskTier::classify(dec!(70), initial), RiskTier::Defensive);
        assert_eq!(RiskTier::classify(dec!(69.99), initial), RiskTier::Recovery);
        assert_eq!(RiskTier::classify(dec!(60), initial), RiskTier::Recovery);
        assert_eq!(RiskTier::classify(dec!(50), initial), RiskTier::Emergency);
        assert_eq!(RiskTier::classify(dec!(49.99), initial), RiskTier::Suspended);
    }

    #[test]
    fn floor_overrides_conservative_cap() {
        // happy path: 2% of 50 is 1.00, floor lifts it to 1.50
        let p = portfolio(dec!(50), dec!(50));
        let c = counter();
        match gate(&guard(), &p, &c, dec!(1.00)) {
            GateDecision::Approved { size, tier } => {
                assert_eq!(size, dec!(1.50));
                assert_eq!(tier, RiskTier::Conservative);
            }
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn degraded_tier_cap_below_floor_is_a_veto() {
        // balance 33 of 50: ratio 0.66 -> Recovery; 0.5% cap = 0.165 < 1.50
        let p = portfolio(dec!(33), dec!(50));
        let c = counter();
        match gate(&guard(), &p, &c, dec!(2.00)) {
            GateDecision::Vetoed { tier, reason } => {
                assert_eq!(tier, RiskTier::Recovery);
                assert_eq!(reason, GateVeto::BelowMinimumAfterTierCap);
            }
            other => panic!("expected veto, got {other:?}"),
        }
    }

    #[test]
    fn suspended_tier_rejects_everything() {
        let p = portfolio(dec!(20), dec!(50));
        let c = counter();
        match gate(&guard(), &p, &c, dec!(1.50)) {
            GateDecision::Vetoed { reason, .. } => {
                assert_eq!(reason, GateVeto::TierSuspended);
            }
            other => panic!("expected veto, got {other:?}"),
        }
    }

    #[test]
    fn daily_caps_veto_in_order() {
        let p = portfolio(dec!(50), dec!(50));

        let mut c = counter();
        c.bets_count = 10;
        match gate(&guard(), &p, &c, dec!(1.50)) {
            GateDecision::Vetoed { reason, .. } => {
                assert_eq!(reason, GateVeto::DailyBetCountExceeded)
            }
            other => panic!("{other:?}"),
        }

        let mut c = counter();
        c.realized_loss = dec!(5); // conservative cap is 10% of 50
        match gate(&guard(), &p, &c, dec!(1.50)) {
            GateDecision::Vetoed { reason, .. } => assert_eq!(reason, GateVeto::DailyLossCapHit),
            other => panic!("{other:?}"),
        }

        let mut c = counter();
        c.spent = dec!(4.00); // TEST spend cap is 5
        match gate(&guard(), &p, &c, dec!(1.50)) {
            GateDecision::Vetoed { reason, .. } => assert_eq!(reason, GateVeto::DailySpendExceeded),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn position_and_exposure_limits() {
        let p = portfolio(dec!(50), dec!(50));
        let c = counter();
        let g = guard();

        let decision = g.gate(&GateInputs {
            portfolio: &p,
            counter: &c,
            desired_size: dec!(1.50),
            open_positions: 5,
            open_exposure: Decimal::ZERO,
            category_exposure: Decimal::ZERO,
        });
        match decision {
            GateDecision::Vetoed { reason, .. } => assert_eq!(reason, GateVeto::MaxOpenPositions),
            other => panic!("{other:?}"),
        }

        let decision = g.gate(&GateInputs {
            portfolio: &p,
            counter: &c,
            desired_size: dec!(1.50),
            open_positions: 0,
            open_exposure: Decimal::ZERO,
            category_exposure: dec!(14.00), // cap is 30% of 50 = 15
        });
        match decision {
            GateDecision::Vetoed { reason, .. } => {
                assert_eq!(reason, GateVeto::CategoryExposureCap)
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn floor_never_overrides_available_balance() {
        let p = portfolio(dec!(50), dec!(50));
        let c = counter();
        let g = guard();

        let decision = g.gate(&GateInputs {
            portfolio: &p,
            counter: &c,
            desired_size: dec!(1.00),
            open_positions: 1,
            open_exposure: dec!(49.00), // only 1.00 available, floor is 1.50
            category_exposure: Decimal::ZERO,
        });
        match decision {
            GateDecision::Vetoed { reason, .. } => assert_eq!(reason, GateVeto::BelowMinimum),
            other => panic!("{other:?}"),
        }
    }
}
