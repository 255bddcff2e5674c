// =============================================================================
// Config — immutable process configuration, built once at startup
// =============================================================================
//
// Every tunable lives here, read from the process environment a single time
// in `Config::from_env`. No other component reads `std::env` directly --
// every tunable in one immutable, env-sourced snapshot built once at startup.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DataError;

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_blacklist(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Immutable configuration snapshot built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // --- Universe filter thresholds -----------------------------------------
    pub min_volume_24h_usdt: f64,
    pub min_open_interest_usdt: f64,
    pub min_price_usdt: f64,
    pub max_price_usdt: f64,
    pub blacklist_symbols: Vec<String>,

    // --- Scoring / dispatch ---------------------------------------------------
    pub min_score_threshold: f64,
    pub cooldown_seconds: u64,
    pub max_alerts_per_hour: u32,
    pub enable_btc_context: bool,

    // --- Exchange -------------------------------------------------------------
    pub bybit_testnet: bool,

    // --- Notification sink ------------------------------------------------------
    pub notification_url: String,

    // --- Optional external stores ----------------------------------------------
    pub redis_url: Option<String>,
    pub postgres_url: Option<String>,
}

impl Config {
    /// Build the configuration from the process environment. Returns
    /// `ConfigError` if the required notification URL is missing -- the only
    /// fatal-at-startup configuration condition (spec.md ConfigError policy).
    pub fn from_env() -> Result<Self, DataError> {
        let notification_url = std::env::var("NOTIFICATION_WEBHOOK_URL")
            .map_err(|_| DataError::Config("NOTIFICATION_WEBHOOK_URL is required".into()))?;

        let config = Self {
            min_volume_24h_usdt: env_f64("MIN_VOLUME_24H_USDT", 1_000_000.0),
            min_open_interest_usdt: env_f64("MIN_OPEN_INTEREST_USDT", 500_000.0),
            min_price_usdt: env_f64("MIN_PRICE_USDT", 0.0001),
            max_price_usdt: env_f64("MAX_PRICE_USDT", 100_000.0),
            blacklist_symbols: env_blacklist("BLACKLIST_SYMBOLS"),
            min_score_threshold: env_f64("MIN_SCORE_THRESHOLD", 75.0),
            cooldown_seconds: env_u64("COOLDOWN_SECONDS", 300),
            max_alerts_per_hour: env_u32("MAX_ALERTS_PER_HOUR", 20),
            enable_btc_context: env_bool("ENABLE_BTC_CONTEXT", true),
            bybit_testnet: env_bool("BYBIT_TESTNET", false),
            notification_url,
            redis_url: std::env::var("REDIS_URL").ok(),
            postgres_url: std::env::var("POSTGRES_URL").ok(),
        };

        info!(
            min_score_threshold = config.min_score_threshold,
            cooldown_seconds = config.cooldown_seconds,
            max_alerts_per_hour = config.max_alerts_per_hour,
            enable_btc_context = config.enable_btc_context,
            blacklist_count = config.blacklist_symbols.len(),
            "configuration loaded"
        );

        Ok(config)
    }

    pub fn is_blacklisted(&self, symbol: &str) -> bool {
        let upper = symbol.to_uppercase();
        self.blacklist_symbols.iter().any(|b| b == &upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_notification_url_is_fatal() {
        // SAFETY: tests run single-threaded per-module by default for env
        // mutation here; this test only reads a var it never sets.
        std::env::remove_var("NOTIFICATION_WEBHOOK_URL");
        let result = Config::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn blacklist_matching_is_case_insensitive() {
        std::env::set_var("NOTIFICATION_WEBHOOK_URL", "https://example.test/hook");
        std::env::set_var("BLACKLIST_SYMBOLS", "fooUSDT, BarUSDT");
        let config = Config::from_env().unwrap();
        assert!(config.is_blacklisted("FOOUSDT"));
        assert!(config.is_blacklisted("barusdt"));
        assert!(!config.is_blacklisted("BAZUSDT"));
        std::env::remove_var("BLACKLIST_SYMBOLS");
        std::env::remove_var("NOTIFICATION_WEBHOOK_URL");
    }

    #[test]
    fn defaults_match_spec() {
        std::env::set_var("NOTIFICATION_WEBHOOK_URL", "https://example.test/hook");
        std::env::remove_var("MIN_VOLUME_24H_USDT");
        let config = Config::from_env().unwrap();
        assert_eq!(config.min_volume_24h_usdt, 1_000_000.0);
        assert_eq!(config.min_open_interest_usdt, 500_000.0);
        assert_eq!(config.min_price_usdt, 0.0001);
        assert_eq!(config.max_price_usdt, 100_000.0);
        assert_eq!(config.min_score_threshold, 75.0);
        assert_eq!(config.cooldown_seconds, 300);
        assert_eq!(config.max_alerts_per_hour, 20);
        std::env::remove_var("NOTIFICATION_WEBHOOK_URL");
    }
}
