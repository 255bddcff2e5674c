// =============================================================================
// Universe Loader — one-shot construction of the monitored symbol set
// =============================================================================

use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::DataError;
use crate::exchange::client::ExchangeClient;
use crate::exchange::wire::TickerSnapshot;

#[derive(Debug, Default)]
struct RejectionCounts {
    low_volume: u32,
    low_open_interest: u32,
    price_out_of_range: u32,
    no_funding_rate: u32,
    blacklisted: u32,
}

/// Produces the one-shot set of symbols this process monitors for the
/// lifetime of the run.
pub struct UniverseLoader<'a> {
    exchange: &'a ExchangeClient,
    config: &'a Config,
}

impl<'a> UniverseLoader<'a> {
    pub fn new(exchange: &'a ExchangeClient, config: &'a Config) -> Self {
        Self { exchange, config }
    }

    /// Fetch instruments and a bulk ticker snapshot, apply quality filters,
    /// and return the accepted symbol set.
    ///
    /// Instrument-fetch failure is fatal and propagates. A bulk-ticker
    /// failure degrades gracefully to the unfiltered instrument list.
    pub async fn load_universe(&self) -> Result<Vec<String>, DataError> {
        let instruments = self.exchange.get_instruments().await?;
        let symbols: Vec<String> = instruments.into_iter().map(|i| i.symbol).collect();

        let tickers = match self.exchange.get_tickers().await {
            Ok(tickers) => tickers,
            Err(e) => {
                warn!(error = %e, "bulk ticker fetch failed, degrading to unfiltered instrument list");
                return Ok(symbols
                    .into_iter()
                    .filter(|s| !self.config.is_blacklisted(s))
                    .collect());
            }
        };

        let by_symbol: HashMap<&str, &TickerSnapshot> =
            tickers.iter().map(|t| (t.symbol.as_str(), t)).collect();

        let (accepted, rejections) = filter_symbols(&symbols, &by_symbol, self.config);

        info!(
            accepted = accepted.len(),
            rejected_low_volume = rejections.low_volume,
            rejected_low_open_interest = rejections.low_open_interest,
            rejected_price_out_of_range = rejections.price_out_of_range,
            rejected_no_funding_rate = rejections.no_funding_rate,
            rejected_blacklisted = rejections.blacklisted,
            "universe loaded"
        );

        Ok(accepted)
    }
}

/// Pure filter step, factored out so it can be exercised without a live
/// exchange connection: 24h turnover, open-interest (with OI-count
/// fallback), price band, funding-rate presence, and blacklist.
fn filter_symbols(
    symbols: &[String],
    by_symbol: &HashMap<&str, &TickerSnapshot>,
    config: &Config,
) -> (Vec<String>, RejectionCounts) {
    let mut accepted = Vec::new();
    let mut rejections = RejectionCounts::default();

    for symbol in symbols {
        if config.is_blacklisted(symbol) {
            rejections.blacklisted += 1;
            continue;
        }

        let Some(ticker) = by_symbol.get(symbol.as_str()) else {
            rejections.no_funding_rate += 1;
            continue;
        };

        if ticker.turnover_24h < config.min_volume_24h_usdt {
            rejections.low_volume += 1;
            continue;
        }

        let oi_ok = if ticker.open_interest_value > 0.0 {
            ticker.open_interest_value >= config.min_open_interest_usdt
        } else {
            ticker.open_interest >= config.min_open_interest_usdt / 1000.0
        };
        if !oi_ok {
            rejections.low_open_interest += 1;
            continue;
        }

        if ticker.last_price < config.min_price_usdt || ticker.last_price > config.max_price_usdt
        {
            rejections.price_out_of_range += 1;
            continue;
        }

        if ticker.funding_rate_pct.is_none() {
            rejections.no_funding_rate += 1;
            continue;
        }

        accepted.push(symbol.clone());
    }

    (accepted, rejections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        std::env::set_var("NOTIFICATION_WEBHOOK_URL", "https://example.test/hook");
        let config = Config::from_env().unwrap();
        std::env::remove_var("NOTIFICATION_WEBHOOK_URL");
        config
    }

    fn snapshot(symbol: &str, turnover: f64, oi_value: f64, price: f64, funding: Option<f64>) -> TickerSnapshot {
        TickerSnapshot {
            symbol: symbol.to_string(),
            last_price: price,
            turnover_24h: turnover,
            open_interest: 0.0,
            open_interest_value: oi_value,
            funding_rate_pct: funding,
        }
    }

    #[test]
    fn accepts_symbol_passing_every_filter() {
        let cfg = config();
        let symbols = vec!["BTCUSDT".to_string()];
        let t = snapshot("BTCUSDT", 2_000_000.0, 600_000.0, 50_000.0, Some(0.01));
        let by_symbol: HashMap<&str, &TickerSnapshot> = [("BTCUSDT", &t)].into_iter().collect();
        let (accepted, rejections) = filter_symbols(&symbols, &by_symbol, &cfg);
        assert_eq!(accepted, vec!["BTCUSDT".to_string()]);
        assert_eq!(rejections.low_volume, 0);
    }

    #[test]
    fn rejects_low_volume() {
        let cfg = config();
        let symbols = vec!["BTCUSDT".to_string()];
        let t = snapshot("BTCUSDT", 100.0, 600_000.0, 50_000.0, Some(0.01));
        let by_symbol: HashMap<&str, &TickerSnapshot> = [("BTCUSDT", &t)].into_iter().collect();
        let (accepted, rejections) = filter_symbols(&symbols, &by_symbol, &cfg);
        assert!(accepted.is_empty());
        assert_eq!(rejections.low_volume, 1);
    }

    #[test]
    fn oi_falls_back_to_open_interest_count_when_value_missing() {
        let cfg = config();
        let symbols = vec!["BTCUSDT".to_string()];
        let mut t = snapshot("BTCUSDT", 2_000_000.0, 0.0, 50_000.0, Some(0.01));
        t.open_interest = 600.0; // threshold/1000 = 500, so this passes
        let by_symbol: HashMap<&str, &TickerSnapshot> = [("BTCUSDT", &t)].into_iter().collect();
        let (accepted, _) = filter_symbols(&symbols, &by_symbol, &cfg);
        assert_eq!(accepted, vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn rejects_missing_funding_rate() {
        let cfg = config();
        let symbols = vec!["BTCUSDT".to_string()];
        let t = snapshot("BTCUSDT", 2_000_000.0, 600_000.0, 50_000.0, None);
        let by_symbol: HashMap<&str, &TickerSnapshot> = [("BTCUSDT", &t)].into_iter().collect();
        let (accepted, rejections) = filter_symbols(&symbols, &by_symbol, &cfg);
        assert!(accepted.is_empty());
        assert_eq!(rejections.no_funding_rate, 1);
    }

    #[test]
    fn blacklist_rejects_case_insensitively() {
        std::env::set_var("NOTIFICATION_WEBHOOK_URL", "https://example.test/hook");
        std::env::set_var("BLACKLIST_SYMBOLS", "btcusdt");
        let cfg = Config::from_env().unwrap();
        std::env::remove_var("NOTIFICATION_WEBHOOK_URL");
        std::env::remove_var("BLACKLIST_SYMBOLS");

        let symbols = vec!["BTCUSDT".to_string()];
        let t = snapshot("BTCUSDT", 2_000_000.0, 600_000.0, 50_000.0, Some(0.01));
        let by_symbol: HashMap<&str, &TickerSnapshot> = [("BTCUSDT", &t)].into_iter().collect();
        let (accepted, rejections) = filter_symbols(&symbols, &by_symbol, &cfg);
        assert!(accepted.is_empty());
        assert_eq!(rejections.blacklisted, 1);
    }
}
