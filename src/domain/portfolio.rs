use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-firm bankroll. Created at firm registration, mutated only by
/// resolutions and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub firm: String,
    pub balance: Decimal,
    pub initial_balance: Decimal,
    /// Monotonically non-decreasing high-water mark.
    pub peak_balance: Decimal,
    pub consecutive_wins: i64,
    pub consecutive_losses: i64,
    pub last_update: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(firm: &str, initial_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            firm: firm.to_string(),
            balance: initial_balance,
            initial_balance,
            peak_balance: initial_balance,
            consecutive_wins: 0,
            consecutive_losses: 0,
            last_update: now,
        }
    }

    /// Apply a resolved bet's profit/loss and update streaks.
    pub fn apply_result(&mut self, profit_loss: Decimal, won: bool, now: DateTime<Utc>) {
        self.balance += profit_loss;
        if self.balance < Decimal::ZERO {
            self.balance = Decimal::ZERO;
        }
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        if won {
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.consecutive_wins = 0;
            self.consecutive_losses += 1;
        }
        self.last_update = now;
    }

    pub fn balance_ratio(&self) -> Decimal {
        if self.initial_balance.is_zero() {
            Decimal::ZERO
        } else {
            self.balance / self.initial_balance
        }
    }
}

/// Per-firm, per-UTC-day counters. Reset lazily on first access after the
/// calendar day advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCounter {
    pub firm: String,
    pub day: NaiveDate,
    pub bets_count: i64,
    pub spent: Decimal,
    pub realized_loss: Decimal,
}

impl DailyCounter {
    pub fn fresh(firm: &str, day: NaiveDate) -> Self {
        Self {
            firm: firm.to_string(),
            day,
            bets_count: 0,
            spent: Decimal::ZERO,
            realized_loss: Decimal::ZERO,
        }
    }

    /// Roll over to `today` if the stored day is stale.
    pub fn rolled(self, today: NaiveDate) -> Self {
        if self.day == today {
            self
        } else {
            Self::fresh(&self.firm, today)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn win_extends_streak_and_raises_peak() {
        let mut p = Portfolio::new("Grok", dec!(50), Utc::now());
        p.apply_result(dec!(2.10), true, Utc::now());
        p.apply_result(dec!(1.05), true, Utc::now());

        assert_eq!(p.balance, dec!(53.15));
        assert_eq!(p.peak_balance, dec!(53.15));
        assert_eq!(p.consecutive_wins, 2);
        assert_eq!(p.consecutive_losses, 0);
    }

    #[test]
    fn loss_resets_win_streak_but_not_peak() {
        let mut p = Portfolio::new("Grok", dec!(50), Utc::now());
        p.apply_result(dec!(4), true, Utc::now());
        p.apply_result(dec!(-6), false, Utc::now());

        assert_eq!(p.balance, dec!(48));
        assert_eq!(p.peak_balance, dec!(54));
        assert_eq!(p.consecutive_wins, 0);
        assert_eq!(p.consecutive_losses, 1);
    }

    #[test]
    fn counter_rolls_over_on_new_day() {
        let day1 = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();

        let mut c = DailyCounter::fresh("Qwen", day1);
        c.bets_count = 3;
        c.spent = dec!(4.50);
        c.realized_loss = dec!(1.50);

        let same = c.clone().rolled(day1);
        assert_eq!(same.bets_count, 3);

        let next = c.rolled(day2);
        assert_eq!(next.day, day2);
        assert_eq!(next.bets_count, 0);
        assert_eq!(next.spent, Decimal::ZERO);
        assert_eq!(next.realized_loss, Decimal::ZERO);
    }
}
