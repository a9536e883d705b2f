use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::{Result, TipsterError};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub bankroll: BankrollConfig,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Master switch; cycles refuse to run when false.
    #[serde(default)]
    pub system_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_database_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_database_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://tipster.db".to_string()
}

fn default_database_max_connections() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_venue_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Custody wallet key; held for the gateway, never logged.
    #[serde(default)]
    pub private_key: String,
    /// Taker fee charged on payout at win time.
    #[serde(default = "default_venue_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default = "default_venue_page_size")]
    pub page_size: u32,
    /// Stop the page walk after this many listed markets.
    #[serde(default = "default_venue_market_cap")]
    pub market_cap: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            base_url: default_venue_base_url(),
            api_key: String::new(),
            private_key: String::new(),
            fee_rate: default_venue_fee_rate(),
            page_size: default_venue_page_size(),
            market_cap: default_venue_market_cap(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_venue_base_url() -> String {
    "https://proxy.opinion.trade:8443".to_string()
}

fn default_venue_fee_rate() -> Decimal {
    dec!(0.03)
}

fn default_venue_page_size() -> u32 {
    20
}

fn default_venue_market_cap() -> u32 {
    200
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Bankroll provisioning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BankrollMode {
    Test,
    Production,
}

impl FromStr for BankrollMode {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "TEST" => Ok(Self::Test),
            "PRODUCTION" | "PROD" => Ok(Self::Production),
            _ => Err("BANKROLL_MODE must be TEST or PRODUCTION"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankrollConfig {
    #[serde(default = "default_bankroll_mode")]
    pub mode: BankrollMode,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            mode: default_bankroll_mode(),
        }
    }
}

fn default_bankroll_mode() -> BankrollMode {
    BankrollMode::Test
}

impl BankrollConfig {
    pub fn initial_balance(&self) -> Decimal {
        match self.mode {
            BankrollMode::Test => dec!(50),
            BankrollMode::Production => dec!(5000),
        }
    }

    pub fn daily_spend_cap(&self) -> Option<Decimal> {
        match self.mode {
            BankrollMode::Test => Some(dec!(5)),
            BankrollMode::Production => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskSettings {
    /// Minimum bet in quote units; the venue enforces 1.30 downstream.
    #[serde(default = "default_min_bet")]
    pub min_bet: Decimal,
    #[serde(default = "default_max_daily_bets")]
    pub max_daily_bets: i64,
    /// Per-category open-exposure ceiling as a fraction of balance.
    #[serde(default = "default_category_exposure_fraction")]
    pub category_exposure_fraction: Decimal,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            min_bet: default_min_bet(),
            max_daily_bets: default_max_daily_bets(),
            category_exposure_fraction: default_category_exposure_fraction(),
        }
    }
}

fn default_min_bet() -> Decimal {
    dec!(1.50)
}

fn default_max_daily_bets() -> i64 {
    10
}

fn default_category_exposure_fraction() -> Decimal {
    dec!(0.30)
}

/// Sizing-strategy coefficients. The strategy shapes are fixed; the knobs
/// here are tunable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,
    #[serde(default = "default_base_fraction")]
    pub base_fraction: Decimal,
    /// Normal per-bet ceiling as a fraction of bankroll.
    #[serde(default = "default_max_bet_fraction")]
    pub max_bet_fraction: Decimal,
    #[serde(default = "default_martingale_multiplier")]
    pub martingale_multiplier: Decimal,
    #[serde(default = "default_anti_martingale_multiplier")]
    pub anti_martingale_multiplier: Decimal,
    #[serde(default = "default_max_escalations")]
    pub max_escalations: i64,
    #[serde(default = "default_proportional_coefficient")]
    pub proportional_coefficient: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: default_kelly_fraction(),
            base_fraction: default_base_fraction(),
            max_bet_fraction: default_max_bet_fraction(),
            martingale_multiplier: default_martingale_multiplier(),
            anti_martingale_multiplier: default_anti_martingale_multiplier(),
            max_escalations: default_max_escalations(),
            proportional_coefficient: default_proportional_coefficient(),
        }
    }
}

fn default_kelly_fraction() -> Decimal {
    dec!(0.25)
}

fn default_base_fraction() -> Decimal {
    dec!(0.01)
}

fn default_max_bet_fraction() -> Decimal {
    dec!(0.02)
}

fn default_martingale_multiplier() -> Decimal {
    dec!(1.5)
}

fn default_anti_martingale_multiplier() -> Decimal {
    dec!(1.3)
}

fn default_max_escalations() -> i64 {
    3
}

fn default_proportional_coefficient() -> Decimal {
    dec!(0.05)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    #[serde(default = "default_cycle_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_max_markets_per_firm")]
    pub max_markets_per_firm: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_cycle_deadline_secs(),
            max_markets_per_firm: default_max_markets_per_firm(),
        }
    }
}

fn default_cycle_deadline_secs() -> u64 {
    15 * 60
}

fn default_max_markets_per_firm() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,
    /// Price-manipulation factor threshold as a fraction of submission price.
    #[serde(default = "default_price_move_threshold")]
    pub price_move_threshold: Decimal,
    #[serde(default = "default_stagnation_hours")]
    pub stagnation_hours: i64,
    /// Consecutive strikes before cancellation.
    #[serde(default = "default_strikes_to_cancel")]
    pub strikes_to_cancel: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval_secs(),
            price_move_threshold: default_price_move_threshold(),
            stagnation_hours: default_stagnation_hours(),
            strikes_to_cancel: default_strikes_to_cancel(),
        }
    }
}

fn default_monitor_interval_secs() -> u64 {
    30 * 60
}

fn default_price_move_threshold() -> Decimal {
    dec!(0.15)
}

fn default_stagnation_hours() -> i64 {
    168
}

fn default_strikes_to_cancel() -> i64 {
    3
}

/// Credentials and endpoint for one firm's model provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirmModelConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_model_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub chatgpt: FirmModelConfig,
    #[serde(default)]
    pub gemini: FirmModelConfig,
    #[serde(default)]
    pub qwen: FirmModelConfig,
    #[serde(default)]
    pub deepseek: FirmModelConfig,
    #[serde(default)]
    pub grok: FirmModelConfig,
}

impl ModelsConfig {
    pub fn for_firm(&self, firm: &str) -> Option<FirmModelConfig> {
        let mut config = match firm {
            "ChatGPT" => self.chatgpt.clone(),
            "Gemini" => self.gemini.clone(),
            "Qwen" => self.qwen.clone(),
            "Deepseek" => self.deepseek.clone(),
            "Grok" => self.grok.clone(),
            _ => return None,
        };
        if config.base_url.is_empty() {
            config.base_url = crate::models::default_base_url(firm).to_string();
        }
        Some(config)
    }

    /// Which firms have a key configured. Exposed (as booleans only) by the
    /// health endpoint.
    pub fn configured_flags(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("chatgpt", !self.chatgpt.api_key.is_empty()),
            ("gemini", !self.gemini.api_key.is_empty()),
            ("qwen", !self.qwen.api_key.is_empty()),
            ("deepseek", !self.deepseek.api_key.is_empty()),
            ("grok", !self.grok.api_key.is_empty()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorsConfig {
    #[serde(default)]
    pub alpha_vantage_key: String,
    #[serde(default = "default_alpha_vantage_url")]
    pub alpha_vantage_url: String,
    #[serde(default)]
    pub news_api_key: String,
    #[serde(default = "default_news_api_url")]
    pub news_api_url: String,
    #[serde(default = "default_sentiment_url")]
    pub sentiment_url: String,
    #[serde(default = "default_collector_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            alpha_vantage_key: String::new(),
            alpha_vantage_url: default_alpha_vantage_url(),
            news_api_key: String::new(),
            news_api_url: default_news_api_url(),
            sentiment_url: default_sentiment_url(),
            request_timeout_secs: default_collector_timeout_secs(),
        }
    }
}

fn default_alpha_vantage_url() -> String {
    "https://www.alphavantage.co/query".to_string()
}

fn default_news_api_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_sentiment_url() -> String {
    "https://www.reddit.com/r/wallstreetbets".to_string()
}

fn default_collector_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Shared secret required by the monitor endpoint.
    #[serde(default)]
    pub monitor_secret: String,
    /// Bearer token for the admin endpoints; empty disables them.
    #[serde(default)]
    pub admin_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            monitor_secret: String::new(),
            admin_token: String::new(),
        }
    }
}

fn default_server_port() -> u16 {
    8000
}

impl AppConfig {
    /// Load configuration: optional file, then `TIPSTER__`-prefixed env vars,
    /// then the short env names the deployment surface documents.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let raw = builder
            .add_source(Environment::with_prefix("TIPSTER").separator("__"))
            .build()?;

        let mut config: AppConfig = raw.try_deserialize()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("BANKROLL_MODE") {
            self.bankroll.mode = raw
                .parse()
                .map_err(|e: &str| TipsterError::InvalidConfig(e.to_string()))?;
        }
        if let Ok(raw) = std::env::var("SYSTEM_ENABLED") {
            self.system_enabled = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Ok(raw) = std::env::var("ORDER_MONITOR_SECRET") {
            self.server.monitor_secret = raw;
        }
        if let Ok(raw) = std::env::var("VENUE_API_KEY") {
            self.venue.api_key = raw;
        }
        if let Ok(raw) = std::env::var("VENUE_WALLET_PRIVATE_KEY") {
            self.venue.private_key = raw;
        }
        Ok(())
    }

    /// Validate config invariants. Returns list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.venue.fee_rate < Decimal::ZERO || self.venue.fee_rate >= Decimal::ONE {
            errors.push(format!(
                "venue.fee_rate must be in [0, 1), got {}",
                self.venue.fee_rate
            ));
        }
        if self.risk.min_bet <= Decimal::ZERO {
            errors.push(format!("risk.min_bet must be > 0, got {}", self.risk.min_bet));
        }
        if self.venue.page_size == 0 || self.venue.page_size > 20 {
            errors.push(format!(
                "venue.page_size must be in 1..=20 (venue limit), got {}",
                self.venue.page_size
            ));
        }
        if self.monitor.strikes_to_cancel < 1 {
            errors.push("monitor.strikes_to_cancel must be >= 1".to_string());
        }
        if self.sizing.max_bet_fraction <= Decimal::ZERO {
            errors.push("sizing.max_bet_fraction must be > 0".to_string());
        }
        errors
    }

    /// Validate and fail hard; used at process start.
    pub fn ensure_valid(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(TipsterError::InvalidConfig(problems.join("; ")))
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            venue: VenueConfig::default(),
            bankroll: BankrollConfig::default(),
            risk: RiskSettings::default(),
            sizing: SizingConfig::default(),
            cycle: CycleConfig::default(),
            monitor: MonitorConfig::default(),
            models: ModelsConfig::default(),
            collectors: CollectorsConfig::default(),
            server: ServerConfig::default(),
            system_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_provisions_small_bankroll_with_spend_cap() {
        let bankroll = BankrollConfig {
            mode: BankrollMode::Test,
        };
        assert_eq!(bankroll.initial_balance(), dec!(50));
        assert_eq!(bankroll.daily_spend_cap(), Some(dec!(5)));
    }

    #[test]
    fn production_mode_has_no_spend_cap() {
        let bankroll = BankrollConfig {
            mode: BankrollMode::Production,
        };
        assert_eq!(bankroll.initial_balance(), dec!(5000));
        assert_eq!(bankroll.daily_spend_cap(), None);
    }

    #[test]
    fn defaults_validate_clean() {
        assert!(AppConfig::default().validate().is_empty());
    }

    #[test]
    fn bad_page_size_is_reported() {
        let mut config = AppConfig::default();
        config.venue.page_size = 50;
        let problems = config.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("page_size"));
    }

    #[test]
    fn bankroll_mode_parses_loosely() {
        assert_eq!("test".parse::<BankrollMode>().unwrap(), BankrollMode::Test);
        assert_eq!(
            "PRODUCTION".parse::<BankrollMode>().unwrap(),
            BankrollMode::Production
        );
        assert!("staging".parse::<BankrollMode>().is_err());
    }

    #[test]
    fn firm_model_config_falls_back_to_default_endpoint() {
        let models = ModelsConfig::default();
        let grok = models.for_firm("Grok").unwrap();
        assert_eq!(grok.base_url, "https://api.x.ai/v1");
        assert!(models.for_firm("Claude").is_none());
    }
}
