//! Closed-loop learning feedback.
//!
//! Two read-only views close the loop between results and future decisions:
//! a rolling 7-day per-firm performance review (streaks, per-category win
//! rates, EV-estimate accuracy, actionable recommendations) and a
//! historical-performance-driven recommendation of which firm is currently
//! strongest. Both are served over the read API; nothing here mutates state.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::store::BetOutcome;

/// Rolling review window.
pub const REVIEW_WINDOW_DAYS: i64 = 7;

pub fn review_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(REVIEW_WINDOW_DAYS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Analyzed,
    NoRecentActivity,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryPerformance {
    pub total_bets: i64,
    pub wins: i64,
    pub losses: i64,
    /// Win rate over resolved bets, in percent.
    pub win_rate: Decimal,
    pub profit: Decimal,
}

/// How well positive-EV estimates actually performed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvAccuracy {
    pub resolved: i64,
    pub wins: i64,
    pub win_rate: Decimal,
    pub profit: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReview {
    pub firm: String,
    pub window_days: i64,
    pub status: ReviewStatus,
    pub total_bets: i64,
    pub resolved: i64,
    pub wins: i64,
    pub losses: i64,
    pub win_rate: Decimal,
    pub profit: Decimal,
    pub max_win_streak: i64,
    pub max_loss_streak: i64,
    pub categories: BTreeMap<String, CategoryPerformance>,
    pub ev_accuracy: EvAccuracy,
    pub recommendations: Vec<String>,
    pub key_insights: Vec<String>,
}

fn pct(numerator: i64, denominator: i64) -> Decimal {
    if denominator == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(numerator) * dec!(100) / Decimal::from(denominator))
            .round_dp(2)
            .normalize()
    }
}

/// Analyse one firm's last week of bets. Pure over the fetched outcomes,
/// which arrive oldest first.
pub fn weekly_review(firm: &str, outcomes: &[BetOutcome]) -> WeeklyReview {
    if outcomes.is_empty() {
        return WeeklyReview {
            firm: firm.to_string(),
            window_days: REVIEW_WINDOW_DAYS,
            status: ReviewStatus::NoRecentActivity,
            total_bets: 0,
            resolved: 0,
            wins: 0,
            losses: 0,
            win_rate: Decimal::ZERO,
            profit: Decimal::ZERO,
            max_win_streak: 0,
            max_loss_streak: 0,
            categories: BTreeMap::new(),
            ev_accuracy: EvAccuracy::default(),
            recommendations: vec!["No activity in the last 7 days".to_string()],
            key_insights: Vec::new(),
        };
    }

    let mut wins = 0i64;
    let mut losses = 0i64;
    let mut profit = Decimal::ZERO;
    let mut max_win_streak = 0i64;
    let mut max_loss_streak = 0i64;
    let mut current_streak = 0i64;
    let mut current_won = false;
    let mut categories: BTreeMap<String, CategoryPerformance> = BTreeMap::new();
    let mut ev_accuracy = EvAccuracy::default();

    for outcome in outcomes {
        let entry = categories
            .entry(outcome.category.as_str().to_string())
            .or_default();
        entry.total_bets += 1;

        let Some(won) = outcome.actual_result else {
            continue;
        };

        if won {
            wins += 1;
            entry.wins += 1;
        } else {
            losses += 1;
            entry.losses += 1;
        }
        if let Some(pnl) = outcome.profit_loss {
            profit += pnl;
            entry.profit += pnl;
        }

        // streaks must be consecutive in execution order
        if current_streak > 0 && current_won == won {
            current_streak += 1;
        } else {
            current_streak = 1;
            current_won = won;
        }
        if won {
            max_win_streak = max_win_streak.max(current_streak);
        } else {
            max_loss_streak = max_loss_streak.max(current_streak);
        }

        // every emitted bet was approved on a positive net-EV estimate;
        // track how often that estimate paid off
        if outcome.expected_value > Decimal::ZERO {
            ev_accuracy.resolved += 1;
            if won {
                ev_accuracy.wins += 1;
            }
            if let Some(pnl) = outcome.profit_loss {
                ev_accuracy.profit += pnl;
            }
        }
    }

    let resolved = wins + losses;
    for entry in categories.values_mut() {
        entry.win_rate = pct(entry.wins, entry.wins + entry.losses);
    }
    ev_accuracy.win_rate = pct(ev_accuracy.wins, ev_accuracy.resolved);

    let mut review = WeeklyReview {
        firm: firm.to_string(),
        window_days: REVIEW_WINDOW_DAYS,
        status: ReviewStatus::Analyzed,
        total_bets: outcomes.len() as i64,
        resolved,
        wins,
        losses,
        win_rate: pct(wins, resolved),
        profit,
        max_win_streak,
        max_loss_streak,
        categories,
        ev_accuracy,
        recommendations: Vec::new(),
        key_insights: Vec::new(),
    };
    review.recommendations = build_recommendations(&review);
    review.key_insights = build_insights(&review);
    review
}

fn build_recommendations(review: &WeeklyReview) -> Vec<String> {
    let mut recommendations = Vec::new();

    let resolved_categories: Vec<(&String, &CategoryPerformance)> = review
        .categories
        .iter()
        .filter(|(_, stats)| stats.wins + stats.losses > 0)
        .collect();
    let best = resolved_categories
        .iter()
        .max_by_key(|(_, stats)| stats.win_rate);
    let worst = resolved_categories
        .iter()
        .min_by_key(|(_, stats)| stats.win_rate);

    if let Some((category, stats)) = best {
        if stats.win_rate > dec!(60) {
            recommendations.push(format!(
                "lean into {category} (win rate {}%)",
                stats.win_rate
            ));
        }
    }
    if let Some((category, stats)) = worst {
        if stats.win_rate < dec!(40) && stats.total_bets > 3 {
            recommendations.push(format!(
                "avoid {category} (win rate {}%)",
                stats.win_rate
            ));
        }
    }

    if review.max_loss_streak > 4 {
        recommendations.push(format!(
            "cut stake after 3 consecutive losses (worst streak this week: {})",
            review.max_loss_streak
        ));
    }

    if review.ev_accuracy.resolved > 5 && review.ev_accuracy.win_rate < dec!(50) {
        recommendations.push(
            "review EV estimation: positive-EV picks are resolving under 50%".to_string(),
        );
    }

    if recommendations.is_empty() {
        recommendations.push("performance steady; keep the current strategy".to_string());
    }
    recommendations
}

fn build_insights(review: &WeeklyReview) -> Vec<String> {
    let mut insights = vec![format!("{} bets analysed", review.total_bets)];

    let profitable: Vec<&str> = review
        .categories
        .iter()
        .filter(|(_, stats)| stats.profit > Decimal::ZERO)
        .map(|(category, _)| category.as_str())
        .collect();
    if !profitable.is_empty() {
        insights.push(format!("profitable categories: {}", profitable.join(", ")));
    }

    if review.max_win_streak > 3 {
        insights.push(format!("best win streak: {}", review.max_win_streak));
    }
    if review.max_loss_streak > 3 {
        insights.push(format!("worst loss streak: {}", review.max_loss_streak));
    }
    insights
}

/// One firm's standing for the recommendation scorer.
#[derive(Debug, Clone)]
pub struct FirmStanding {
    pub firm: String,
    pub total_bets: i64,
    pub resolved: i64,
    pub wins: i64,
    pub profit: Decimal,
    /// Return on the initial bankroll, in percent.
    pub roi_pct: Decimal,
}

impl FirmStanding {
    pub fn accuracy_pct(&self) -> Decimal {
        pct(self.wins, self.resolved)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FirmRecommendation {
    pub recommended_firm: String,
    pub reason: String,
    pub confidence: &'static str,
    pub score: Decimal,
    pub alternatives: Vec<String>,
}

/// Recommend the strongest firm from historical performance: accuracy,
/// bankroll return, and share of total profit, weighted 0.4 / 0.3 / 0.3.
pub fn recommend_firm(standings: &[FirmStanding]) -> FirmRecommendation {
    let default = || FirmRecommendation {
        recommended_firm: "ChatGPT".to_string(),
        reason: "No historical data available; defaulting".to_string(),
        confidence: "Low",
        score: Decimal::ZERO,
        alternatives: vec!["Gemini".to_string(), "Qwen".to_string()],
    };

    if standings.iter().all(|s| s.total_bets == 0) {
        return default();
    }

    let with_results: Vec<&FirmStanding> =
        standings.iter().filter(|s| s.resolved > 0).collect();
    if with_results.is_empty() {
        // bets placed but nothing resolved yet: surface the most active firm
        let Some(busiest) = standings.iter().max_by_key(|s| s.total_bets) else {
            return default();
        };
        return FirmRecommendation {
            recommended_firm: busiest.firm.clone(),
            reason: format!(
                "Most active firm ({} bets), no resolved results yet",
                busiest.total_bets
            ),
            confidence: "Low",
            score: Decimal::ZERO,
            alternatives: Vec::new(),
        };
    }

    let max_profit = with_results
        .iter()
        .map(|s| s.profit)
        .fold(Decimal::ZERO, Decimal::max);

    let mut scored: Vec<(Decimal, &FirmStanding)> = with_results
        .iter()
        .map(|standing| {
            let accuracy = standing.accuracy_pct();
            let roi = standing.roi_pct.clamp(dec!(-100), dec!(100));
            let profit_share = if max_profit > Decimal::ZERO {
                (standing.profit / max_profit * dec!(100)).max(Decimal::ZERO)
            } else {
                Decimal::ZERO
            };
            let score = (accuracy * dec!(0.4) + roi * dec!(0.3) + profit_share * dec!(0.3))
                .round_dp(2);
            (score, *standing)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let (score, best) = scored[0];
    let mut reasons = Vec::new();
    if best.accuracy_pct() > dec!(60) {
        reasons.push(format!("accuracy {}%", best.accuracy_pct()));
    }
    if best.roi_pct > Decimal::ZERO {
        reasons.push(format!("ROI {}%", best.roi_pct.round_dp(1)));
    }
    if best.profit > Decimal::ZERO {
        reasons.push(format!("net profit {}", best.profit.round_dp(2)));
    }
    let reason = if reasons.is_empty() {
        "Best overall score".to_string()
    } else {
        reasons.join(" | ")
    };

    let confidence = if best.resolved >= 10 {
        "High"
    } else if best.resolved >= 5 {
        "Medium"
    } else {
        "Low"
    };

    FirmRecommendation {
        recommended_firm: best.firm.clone(),
        reason,
        confidence,
        score,
        alternatives: scored
            .iter()
            .skip(1)
            .take(2)
            .map(|(_, s)| s.firm.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketCategory;

    fn outcome(
        category: MarketCategory,
        result: Option<bool>,
        pnl: Option<Decimal>,
        minutes_ago: i64,
    ) -> BetOutcome {
        BetOutcome {
            category,
            size: dec!(1.50),
            expected_value: dec!(0.50),
            actual_result: result,
            profit_loss: pnl,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn standing(firm: &str, total: i64, resolved: i64, wins: i64, profit: Decimal) -> FirmStanding {
        FirmStanding {
            firm: firm.to_string(),
            total_bets: total,
            resolved,
            wins,
            profit,
            roi_pct: if profit > Decimal::ZERO { dec!(4) } else { dec!(-4) },
        }
    }

    #[test]
    fn empty_window_reports_no_activity() {
        let review = weekly_review("Qwen", &[]);
        assert_eq!(review.status, ReviewStatus::NoRecentActivity);
        assert_eq!(review.total_bets, 0);
        assert_eq!(review.recommendations.len(), 1);
    }

    #[test]
    fn streaks_are_consecutive_in_execution_order() {
        let outcomes = vec![
            outcome(MarketCategory::Crypto, Some(true), Some(dec!(2)), 500),
            outcome(MarketCategory::Crypto, Some(true), Some(dec!(2)), 400),
            outcome(MarketCategory::Finance, Some(false), Some(dec!(-1.5)), 300),
            outcome(MarketCategory::Crypto, Some(true), Some(dec!(2)), 200),
            // unresolved bets never break a streak
            outcome(MarketCategory::Crypto, None, None, 100),
        ];
        let review = weekly_review("Grok", &outcomes);

        assert_eq!(review.status, ReviewStatus::Analyzed);
        assert_eq!(review.total_bets, 5);
        assert_eq!(review.resolved, 4);
        assert_eq!(review.max_win_streak, 2);
        assert_eq!(review.max_loss_streak, 1);
        assert_eq!(review.win_rate, dec!(75));
        assert_eq!(review.profit, dec!(4.5));
    }

    #[test]
    fn category_breakdown_tracks_win_rates_and_profit() {
        let outcomes = vec![
            outcome(MarketCategory::Crypto, Some(true), Some(dec!(2)), 300),
            outcome(MarketCategory::Crypto, Some(true), Some(dec!(2)), 200),
            outcome(MarketCategory::Finance, Some(false), Some(dec!(-1.5)), 100),
        ];
        let review = weekly_review("Gemini", &outcomes);

        let crypto = &review.categories["Crypto"];
        assert_eq!(crypto.total_bets, 2);
        assert_eq!(crypto.win_rate, dec!(100));
        assert_eq!(crypto.profit, dec!(4));

        let finance = &review.categories["Finance"];
        assert_eq!(finance.win_rate, dec!(0));
        assert_eq!(finance.profit, dec!(-1.5));

        // strong category surfaces as a lean-in recommendation
        assert!(review
            .recommendations
            .iter()
            .any(|r| r.contains("lean into Crypto")));
        assert!(review
            .key_insights
            .iter()
            .any(|i| i.contains("profitable categories: Crypto")));
    }

    #[test]
    fn long_loss_streak_triggers_stake_cut_recommendation() {
        let outcomes: Vec<BetOutcome> = (0..5)
            .map(|i| {
                outcome(
                    MarketCategory::Crypto,
                    Some(false),
                    Some(dec!(-1.5)),
                    500 - i * 60,
                )
            })
            .collect();
        let review = weekly_review("Deepseek", &outcomes);

        assert_eq!(review.max_loss_streak, 5);
        assert!(review
            .recommendations
            .iter()
            .any(|r| r.contains("cut stake after 3 consecutive losses")));
    }

    #[test]
    fn poor_ev_accuracy_is_called_out() {
        let outcomes: Vec<BetOutcome> = (0..8)
            .map(|i| {
                outcome(
                    MarketCategory::Crypto,
                    Some(i % 3 == 0), // 3 of 8 win
                    Some(if i % 3 == 0 { dec!(2) } else { dec!(-1.5) }),
                    800 - i * 60,
                )
            })
            .collect();
        let review = weekly_review("Qwen", &outcomes);

        assert!(review.ev_accuracy.win_rate < dec!(50));
        assert!(review
            .recommendations
            .iter()
            .any(|r| r.contains("review EV estimation")));
    }

    #[test]
    fn recommendation_defaults_without_history() {
        let standings = vec![
            standing("ChatGPT", 0, 0, 0, dec!(0)),
            standing("Grok", 0, 0, 0, dec!(0)),
        ];
        let rec = recommend_firm(&standings);
        assert_eq!(rec.recommended_firm, "ChatGPT");
        assert_eq!(rec.confidence, "Low");
    }

    #[test]
    fn unresolved_history_recommends_the_most_active_firm() {
        let standings = vec![
            standing("ChatGPT", 2, 0, 0, dec!(0)),
            standing("Grok", 6, 0, 0, dec!(0)),
        ];
        let rec = recommend_firm(&standings);
        assert_eq!(rec.recommended_firm, "Grok");
        assert!(rec.reason.contains("Most active"));
    }

    #[test]
    fn best_performer_wins_with_alternatives_ranked() {
        let standings = vec![
            standing("ChatGPT", 12, 12, 9, dec!(11.40)),
            standing("Gemini", 10, 10, 4, dec!(-3.10)),
            standing("Qwen", 8, 8, 5, dec!(2.20)),
        ];
        let rec = recommend_firm(&standings);

        assert_eq!(rec.recommended_firm, "ChatGPT");
        assert_eq!(rec.confidence, "High");
        assert!(rec.reason.contains("accuracy 75%"));
        assert_eq!(rec.alternatives, vec!["Qwen".to_string(), "Gemini".to_string()]);
    }
}
