// =============================================================================
// Market State Store — single source of truth for per-symbol live state
// =============================================================================
//
// Owns every piece of per-symbol state the rest of the pipeline reads:
// latest ticker, latest funding, a capped close-price series, and a capped
// funding history. Mutations happen under a per-symbol shard rather than one
// lock per collection, so updates to unrelated symbols never contend.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::exchange::client::{ExchangeClient, KlineInterval};
use crate::exchange::wire::{FundingUpdate, PriceUpdate};

const PRICE_SERIES_CAPACITY: usize = 100;
const FUNDING_HISTORY_CAPACITY: usize = 10;
const INIT_BATCH_SIZE: usize = 20;
const INIT_BATCH_SPACING_MS: u64 = 300;

/// Latest-observed ticker snapshot for a symbol.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub last_price: f64,
    pub turnover_24h: f64,
    pub open_interest_value: f64,
    pub observed_at: chrono::DateTime<Utc>,
}

/// Latest-observed funding snapshot for a symbol.
#[derive(Debug, Clone, Copy)]
pub struct Funding {
    pub rate_pct: f64,
    pub next_funding_time: i64,
    pub observed_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct SymbolState {
    ticker: Option<Ticker>,
    funding: Option<Funding>,
    prices: VecDeque<f64>,
    funding_history: VecDeque<Funding>,
}

/// Authoritative in-memory state for every monitored symbol.
///
/// Reads and writes for a given symbol are serialized through that symbol's
/// shard lock; readers never observe a partially-applied update. No entry is
/// created implicitly by a getter -- only `init_symbol`, `ingest_ticker`, and
/// `ingest_funding` create state.
pub struct MarketStateStore {
    shards: RwLock<HashMap<String, Arc<RwLock<SymbolState>>>>,
    exchange: Arc<ExchangeClient>,
}

impl MarketStateStore {
    pub fn new(exchange: Arc<ExchangeClient>) -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            exchange,
        }
    }

    fn shard_for(&self, symbol: &str) -> Arc<RwLock<SymbolState>> {
        if let Some(shard) = self.shards.read().get(symbol) {
            return Arc::clone(shard);
        }
        Arc::clone(
            self.shards
                .write()
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(SymbolState::default()))),
        )
    }

    /// Seed `PriceSeries` from a 100-point 1-minute candle fetch for a single
    /// symbol. Does not touch ticker/funding caches -- those arrive from the
    /// transports.
    pub async fn init_symbol(&self, symbol: &str) -> Result<()> {
        let closes = self
            .exchange
            .get_klines(symbol, KlineInterval::OneMinute, PRICE_SERIES_CAPACITY as u32)
            .await
            .with_context(|| format!("seeding price series for {symbol}"))?;

        let shard = self.shard_for(symbol);
        let mut state = shard.write();
        state.prices = closes.into_iter().collect();
        while state.prices.len() > PRICE_SERIES_CAPACITY {
            state.prices.pop_front();
        }
        Ok(())
    }

    /// Initialize every symbol in `symbols`, batching `INIT_BATCH_SIZE` at a
    /// time with `INIT_BATCH_SPACING_MS` between batches to respect the
    /// exchange's request-rate limits. A symbol whose seed fetch fails is
    /// logged and skipped; it still gets live updates from the transports.
    pub async fn init_universe(&self, symbols: &[String]) {
        for batch in symbols.chunks(INIT_BATCH_SIZE) {
            let futures = batch.iter().map(|symbol| self.init_symbol(symbol));
            let results = futures_util::future::join_all(futures).await;
            for (symbol, result) in batch.iter().zip(results) {
                if let Err(e) = result {
                    warn!(symbol, error = %e, "failed to seed price series, will rely on live ticks");
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(INIT_BATCH_SPACING_MS)).await;
        }
        info!(symbols = symbols.len(), "universe initialization complete");
    }

    /// Apply a ticker update: refresh the ticker cache and append to the
    /// price series, evicting the oldest entry beyond capacity.
    pub fn ingest_ticker(&self, update: PriceUpdate) {
        let shard = self.shard_for(&update.symbol);
        let mut state = shard.write();

        let previous = state.ticker.clone();
        state.ticker = Some(Ticker {
            last_price: update.last_price,
            turnover_24h: update
                .turnover_24h
                .unwrap_or_else(|| previous.as_ref().map(|t| t.turnover_24h).unwrap_or(0.0)),
            open_interest_value: update.open_interest_value.unwrap_or_else(|| {
                previous.as_ref().map(|t| t.open_interest_value).unwrap_or(0.0)
            }),
            observed_at: Utc::now(),
        });

        state.prices.push_back(update.last_price);
        while state.prices.len() > PRICE_SERIES_CAPACITY {
            state.prices.pop_front();
        }
        debug!(symbol = %update.symbol, price = update.last_price, "ticker ingested");
    }

    /// Apply a funding update: refresh the funding cache and append to the
    /// funding history, evicting the oldest entry beyond capacity.
    pub fn ingest_funding(&self, update: FundingUpdate) {
        let shard = self.shard_for(&update.symbol);
        let mut state = shard.write();

        let funding = Funding {
            rate_pct: update.funding_rate_pct,
            next_funding_time: update.next_funding_time,
            observed_at: Utc::now(),
        };

        state.funding = Some(funding);
        state.funding_history.push_back(funding);
        while state.funding_history.len() > FUNDING_HISTORY_CAPACITY {
            state.funding_history.pop_front();
        }
        debug!(symbol = %update.symbol, rate_pct = update.funding_rate_pct, "funding ingested");
    }

    pub fn get_market(&self, symbol: &str) -> Option<Ticker> {
        self.shards.read().get(symbol)?.read().ticker.clone()
    }

    pub fn get_funding(&self, symbol: &str) -> Option<Funding> {
        self.shards.read().get(symbol)?.read().funding
    }

    pub fn get_price_history(&self, symbol: &str) -> Vec<f64> {
        self.shards
            .read()
            .get(symbol)
            .map(|s| s.read().prices.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn get_funding_history(&self, symbol: &str) -> Vec<Funding> {
        self.shards
            .read()
            .get(symbol)
            .map(|s| s.read().funding_history.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn get_all_symbols(&self) -> Vec<String> {
        self.shards.read().keys().cloned().collect()
    }

    /// Register a symbol with empty state ahead of its first seed fetch, so
    /// it appears in `get_all_symbols` immediately.
    pub fn register_symbol(&self, symbol: &str) {
        self.shard_for(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MarketStateStore {
        MarketStateStore::new(Arc::new(ExchangeClient::new(false)))
    }

    #[test]
    fn price_series_evicts_beyond_capacity() {
        let store = store();
        for i in 0..(PRICE_SERIES_CAPACITY + 10) {
            store.ingest_ticker(PriceUpdate {
                symbol: "BTCUSDT".into(),
                last_price: i as f64,
                turnover_24h: None,
                open_interest_value: None,
            });
        }
        assert_eq!(store.get_price_history("BTCUSDT").len(), PRICE_SERIES_CAPACITY);
    }

    #[test]
    fn funding_history_evicts_beyond_capacity() {
        let store = store();
        for i in 0..(FUNDING_HISTORY_CAPACITY + 5) {
            store.ingest_funding(FundingUpdate {
                symbol: "ETHUSDT".into(),
                funding_rate_pct: i as f64,
                next_funding_time: i as i64,
            });
        }
        assert_eq!(
            store.get_funding_history("ETHUSDT").len(),
            FUNDING_HISTORY_CAPACITY
        );
    }

    #[test]
    fn getters_return_none_for_unknown_symbol() {
        let store = store();
        assert!(store.get_market("NOPEUSDT").is_none());
        assert!(store.get_funding("NOPEUSDT").is_none());
        assert!(store.get_price_history("NOPEUSDT").is_empty());
    }

    #[test]
    fn register_symbol_makes_it_visible_with_empty_state() {
        let store = store();
        store.register_symbol("SOLUSDT");
        assert_eq!(store.get_all_symbols(), vec!["SOLUSDT".to_string()]);
        assert!(store.get_market("SOLUSDT").is_none());
    }
}
