use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Position-sizing strategy assigned to a firm at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingStrategy {
    KellyConservative,
    FixedFractional,
    Proportional,
    MartingaleModified,
    AntiMartingale,
}

impl SizingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KellyConservative => "kelly_conservative",
            Self::FixedFractional => "fixed_fractional",
            Self::Proportional => "proportional",
            Self::MartingaleModified => "martingale_modified",
            Self::AntiMartingale => "anti_martingale",
        }
    }
}

impl std::fmt::Display for SizingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SizingStrategy {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kelly_conservative" => Ok(Self::KellyConservative),
            "fixed_fractional" => Ok(Self::FixedFractional),
            "proportional" => Ok(Self::Proportional),
            "martingale_modified" => Ok(Self::MartingaleModified),
            "anti_martingale" => Ok(Self::AntiMartingale),
            _ => Err("unknown sizing strategy"),
        }
    }
}

/// Identity of one model-backed trading agent. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Firm {
    pub name: String,
    pub model_id: String,
    pub color_tag: String,
    pub strategy: SizingStrategy,
}

impl Firm {
    pub fn new(name: &str, model_id: &str, color_tag: &str, strategy: SizingStrategy) -> Self {
        Self {
            name: name.to_string(),
            model_id: model_id.to_string(),
            color_tag: color_tag.to_string(),
            strategy,
        }
    }
}

/// The five competing firms. Strategy assignment is deliberately diverse so
/// the competition compares sizing behaviour, not just model quality.
pub fn default_roster() -> Vec<Firm> {
    vec![
        Firm::new(
            "ChatGPT",
            "gpt-5",
            "#3B82F6",
            SizingStrategy::KellyConservative,
        ),
        Firm::new(
            "Gemini",
            "gemini-2.5-flash",
            "#8B5CF6",
            SizingStrategy::MartingaleModified,
        ),
        Firm::new(
            "Qwen",
            "qwen-max-2025-01-25",
            "#F97316",
            SizingStrategy::FixedFractional,
        ),
        Firm::new(
            "Deepseek",
            "deepseek-chat",
            "#000000",
            SizingStrategy::Proportional,
        ),
        Firm::new(
            "Grok",
            "grok-2-1212",
            "#06B6D4",
            SizingStrategy::AntiMartingale,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_has_five_unique_firms() {
        let roster = default_roster();
        assert_eq!(roster.len(), 5);

        let mut names: Vec<&str> = roster.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn strategy_round_trips_through_str() {
        for firm in default_roster() {
            let parsed: SizingStrategy = firm.strategy.as_str().parse().unwrap();
            assert_eq!(parsed, firm.strategy);
        }
        assert!(SizingStrategy::from_str("double_or_nothing").is_err());
    }
}
