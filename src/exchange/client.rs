// =============================================================================
// Exchange Client — stateless REST access to instruments, tickers, klines
// =============================================================================
//
// Pure translation of wire formats to internal types; no symbol state is
// retained here (that lives in the Market State Store). One client per
// component, `#[instrument]` tracing on every call, 10 s request timeout.
// =============================================================================

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::DataError;
use crate::exchange::wire::{
    parse_instruments, parse_klines_closes, parse_tickers, InstrumentInfo, TickerSnapshot,
};

const MAINNET_BASE_URL: &str = "https://api.bybit.com";
const TESTNET_BASE_URL: &str = "https://api-testnet.bybit.com";

/// Kline interval accepted by [`ExchangeClient::get_klines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlineInterval {
    OneMinute,
    FiveMinutes,
}

impl KlineInterval {
    fn as_wire_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1",
            Self::FiveMinutes => "5",
        }
    }
}

/// Stateless REST client for the exchange's linear-perpetual market data.
#[derive(Clone)]
pub struct ExchangeClient {
    base_url: String,
    client: reqwest::Client,
}

impl ExchangeClient {
    pub fn new(testnet: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client for ExchangeClient");

        Self {
            base_url: if testnet {
                TESTNET_BASE_URL.to_string()
            } else {
                MAINNET_BASE_URL.to_string()
            }
            .to_string(),
            client,
        }
    }

    /// Build a client that reuses an existing HTTP client (e.g. to share a
    /// connection pool with other components).
    pub fn with_client(testnet: bool, client: reqwest::Client) -> Self {
        Self {
            base_url: if testnet {
                TESTNET_BASE_URL.to_string()
            } else {
                MAINNET_BASE_URL.to_string()
            },
            client,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, DataError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body: Value = resp.json().await?;

        if !status.is_success() {
            return Err(DataError::Exchange {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        Ok(body)
    }

    /// GET `/v5/market/instruments-info` filtered to `category=linear`.
    /// Returns every tradable linear USDT perpetual with status `Trading`.
    #[instrument(skip(self), name = "exchange::get_instruments")]
    pub async fn get_instruments(&self) -> Result<Vec<InstrumentInfo>, DataError> {
        let url = format!(
            "{}/v5/market/instruments-info?category=linear",
            self.base_url
        );
        let body = self.get_json(&url).await?;
        let instruments = parse_instruments(&body)?;

        let trading: Vec<InstrumentInfo> = instruments
            .into_iter()
            .filter(|i| i.status == "Trading")
            .collect();

        debug!(count = trading.len(), "instruments fetched");
        Ok(trading)
    }

    /// GET `/v5/market/tickers` for every linear instrument (bulk snapshot).
    #[instrument(skip(self), name = "exchange::get_tickers")]
    pub async fn get_tickers(&self) -> Result<Vec<TickerSnapshot>, DataError> {
        let url = format!("{}/v5/market/tickers?category=linear", self.base_url);
        let body = self.get_json(&url).await?;
        let tickers = parse_tickers(&body)?;
        debug!(count = tickers.len(), "bulk tickers fetched");
        Ok(tickers)
    }

    /// GET `/v5/market/tickers` for a single symbol.
    #[instrument(skip(self), name = "exchange::get_ticker")]
    pub async fn get_ticker(&self, symbol: &str) -> Result<Option<TickerSnapshot>, DataError> {
        let url = format!(
            "{}/v5/market/tickers?category=linear&symbol={symbol}",
            self.base_url
        );
        let body = self.get_json(&url).await?;
        let tickers = parse_tickers(&body)?;
        Ok(tickers.into_iter().next())
    }

    /// GET `/v5/market/kline`. Returns oldest-first close prices.
    #[instrument(skip(self), name = "exchange::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: u32,
    ) -> Result<Vec<f64>, DataError> {
        let url = format!(
            "{}/v5/market/kline?category=linear&symbol={symbol}&interval={}&limit={limit}",
            self.base_url,
            interval.as_wire_str()
        );
        let body = self.get_json(&url).await?;
        let closes = parse_klines_closes(&body)?;

        if closes.len() < limit as usize {
            warn!(
                symbol,
                requested = limit,
                received = closes.len(),
                "kline fetch returned fewer candles than requested"
            );
        }

        Ok(closes)
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_switches_on_testnet_flag() {
        let main = ExchangeClient::new(false);
        let test = ExchangeClient::new(true);
        assert_eq!(format!("{main:?}"), "ExchangeClient { base_url: \"https://api.bybit.com\" }");
        assert_eq!(
            format!("{test:?}"),
            "ExchangeClient { base_url: \"https://api-testnet.bybit.com\" }"
        );
    }

    #[test]
    fn kline_interval_wire_strings() {
        assert_eq!(KlineInterval::OneMinute.as_wire_str(), "1");
        assert_eq!(KlineInterval::FiveMinutes.as_wire_str(), "5");
    }
}
