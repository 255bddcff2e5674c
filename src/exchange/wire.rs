// =============================================================================
// Exchange wire formats — pure translation, no state
// =============================================================================
//
// Bybit V5-shaped REST and WebSocket payloads. Every numeric field the
// exchange sends as a JSON string is parsed here; funding rates are scaled
// from the exchange's fractional representation to percent on ingress via
// `parse_string_f64` / `scale_funding_pct`.
// =============================================================================

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::error::DataError;

/// Helper: the exchange sends most numeric fields as JSON strings.
pub fn parse_string_f64(val: &Value, name: &str) -> Result<f64> {
    match val {
        Value::String(s) if !s.is_empty() => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} missing or empty"),
    }
}

/// Scale a fractional funding rate (e.g. `0.0001`) into the percent
/// representation used throughout the core (e.g. `0.01`).
pub fn scale_funding_pct(fraction: f64) -> f64 {
    fraction * 100.0
}

// ---------------------------------------------------------------------------
// REST: instruments-info
// ---------------------------------------------------------------------------

/// A single tradable linear perpetual instrument.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentInfo {
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResult {
    list: Vec<InstrumentInfo>,
}

#[derive(Debug, Deserialize)]
struct InstrumentsEnvelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<InstrumentsResult>,
}

pub fn parse_instruments(body: &Value) -> Result<Vec<InstrumentInfo>, DataError> {
    let envelope: InstrumentsEnvelope =
        serde_json::from_value(body.clone()).map_err(|e| DataError::Parse(e.to_string()))?;

    if envelope.ret_code != 0 {
        return Err(DataError::Exchange {
            status: envelope.ret_code as u16,
            body: envelope.ret_msg,
        });
    }

    Ok(envelope
        .result
        .map(|r| r.list)
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// REST: tickers
// ---------------------------------------------------------------------------

/// Bulk or single ticker snapshot, as returned by `/v5/market/tickers`.
#[derive(Debug, Clone)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub last_price: f64,
    pub turnover_24h: f64,
    pub open_interest: f64,
    pub open_interest_value: f64,
    pub funding_rate_pct: Option<f64>,
}

pub fn parse_tickers(body: &Value) -> Result<Vec<TickerSnapshot>, DataError> {
    let ret_code = body["retCode"].as_i64().unwrap_or(-1);
    if ret_code != 0 {
        return Err(DataError::Exchange {
            status: ret_code as u16,
            body: body["retMsg"].as_str().unwrap_or("unknown").to_string(),
        });
    }

    let list = body["result"]["list"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut out = Vec::with_capacity(list.len());
    for entry in list {
        let Some(symbol) = entry["symbol"].as_str() else {
            continue;
        };

        let last_price = parse_string_f64(&entry["lastPrice"], "lastPrice").unwrap_or(0.0);
        let turnover_24h = parse_string_f64(&entry["turnover24h"], "turnover24h").unwrap_or(0.0);
        let open_interest = parse_string_f64(&entry["openInterest"], "openInterest").unwrap_or(0.0);
        let open_interest_value =
            parse_string_f64(&entry["openInterestValue"], "openInterestValue").unwrap_or(0.0);

        let funding_rate_pct = entry
            .get("fundingRate")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<f64>().ok())
            .map(scale_funding_pct);

        out.push(TickerSnapshot {
            symbol: symbol.to_string(),
            last_price,
            turnover_24h,
            open_interest,
            open_interest_value,
            funding_rate_pct,
        });
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// REST: klines
// ---------------------------------------------------------------------------

/// Parse a `/v5/market/kline` response into oldest-first close prices.
///
/// Bybit returns klines newest-first; the exchange client reverses them
/// before returning, per spec.
pub fn parse_klines_closes(body: &Value) -> Result<Vec<f64>, DataError> {
    let ret_code = body["retCode"].as_i64().unwrap_or(-1);
    if ret_code != 0 {
        return Err(DataError::Exchange {
            status: ret_code as u16,
            body: body["retMsg"].as_str().unwrap_or("unknown").to_string(),
        });
    }

    let list = body["result"]["list"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut closes = Vec::with_capacity(list.len());
    for entry in &list {
        let arr = entry
            .as_array()
            .ok_or_else(|| DataError::Parse("kline entry is not an array".into()))?;
        if arr.len() < 5 {
            continue;
        }
        let close = parse_string_f64(&arr[4], "kline.close")
            .map_err(|e| DataError::Parse(e.to_string()))?;
        closes.push(close);
    }

    // Bybit returns newest-first; flip to oldest-first.
    closes.reverse();
    Ok(closes)
}

// ---------------------------------------------------------------------------
// WebSocket frames
// ---------------------------------------------------------------------------

/// A funding update as delivered on the `funding.<SYMBOL>` topic.
#[derive(Debug, Clone)]
pub struct FundingUpdate {
    pub symbol: String,
    pub funding_rate_pct: f64,
    pub next_funding_time: i64,
}

/// A price/ticker update as delivered on the `tickers.<SYMBOL>` topic.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub symbol: String,
    pub last_price: f64,
    pub turnover_24h: Option<f64>,
    pub open_interest_value: Option<f64>,
}

/// Outcome of classifying a single inbound WebSocket text frame.
pub enum StreamFrame {
    Funding(FundingUpdate),
    Ticker(PriceUpdate),
    /// Heartbeat pong, subscribe ack, or any frame we don't act on.
    Ignored,
}

/// Parse a single WebSocket text frame into a typed update, or `Ignored`.
///
/// Malformed frames that carry a recognisable topic are reported as
/// `DataError::Parse`; frames without a `topic` field (pongs, subscribe
/// acks) are `Ignored`, never an error.
pub fn parse_stream_frame(text: &str) -> Result<StreamFrame, DataError> {
    let root: Value = serde_json::from_str(text).map_err(|e| DataError::Parse(e.to_string()))?;

    let Some(topic) = root.get("topic").and_then(|t| t.as_str()) else {
        return Ok(StreamFrame::Ignored);
    };

    if let Some(symbol) = topic.strip_prefix("funding.") {
        let data = &root["data"];
        let funding_rate_pct = data
            .get("fundingRate")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .map(scale_funding_pct)
            .ok_or_else(|| DataError::Parse("funding frame missing fundingRate".into()))?;
        let next_funding_time = data.get("nextFundingTime").and_then(|v| {
            v.as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .or_else(|| v.as_i64())
        });

        return Ok(StreamFrame::Funding(FundingUpdate {
            symbol: symbol.to_string(),
            funding_rate_pct,
            next_funding_time: next_funding_time.unwrap_or(0),
        }));
    }

    if let Some(symbol) = topic.strip_prefix("tickers.") {
        let data = &root["data"];
        let last_price = data
            .get("lastPrice")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());

        // Bybit only sends fields that changed on delta frames; a ticker
        // frame without a price update carries no new information for the
        // Market State Store and is ignored.
        let Some(last_price) = last_price else {
            return Ok(StreamFrame::Ignored);
        };

        let turnover_24h = data
            .get("turnover24h")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());
        let open_interest_value = data
            .get("openInterestValue")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());

        return Ok(StreamFrame::Ticker(PriceUpdate {
            symbol: symbol.to_string(),
            last_price,
            turnover_24h,
            open_interest_value,
        }));
    }

    Ok(StreamFrame::Ignored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_fraction_to_percent() {
        assert!((scale_funding_pct(0.0001) - 0.01).abs() < 1e-12);
        assert!((scale_funding_pct(-0.0005) - (-0.05)).abs() < 1e-12);
    }

    #[test]
    fn parse_funding_frame() {
        let text = r#"{
            "topic": "funding.BTCUSDT",
            "data": { "fundingRate": "0.0001", "nextFundingTime": "1700000000000" }
        }"#;
        match parse_stream_frame(text).unwrap() {
            StreamFrame::Funding(update) => {
                assert_eq!(update.symbol, "BTCUSDT");
                assert!((update.funding_rate_pct - 0.01).abs() < 1e-9);
                assert_eq!(update.next_funding_time, 1700000000000);
            }
            _ => panic!("expected funding frame"),
        }
    }

    #[test]
    fn parse_ticker_frame() {
        let text = r#"{
            "topic": "tickers.ETHUSDT",
            "data": { "lastPrice": "3050.25", "turnover24h": "123456789.1" }
        }"#;
        match parse_stream_frame(text).unwrap() {
            StreamFrame::Ticker(update) => {
                assert_eq!(update.symbol, "ETHUSDT");
                assert!((update.last_price - 3050.25).abs() < 1e-9);
                assert_eq!(update.turnover_24h, Some(123456789.1));
            }
            _ => panic!("expected ticker frame"),
        }
    }

    #[test]
    fn frame_without_topic_is_ignored() {
        let text = r#"{"op":"pong"}"#;
        assert!(matches!(
            parse_stream_frame(text).unwrap(),
            StreamFrame::Ignored
        ));
    }

    #[test]
    fn ticker_frame_without_price_is_ignored() {
        let text = r#"{"topic":"tickers.BTCUSDT","data":{"openInterest":"1200"}}"#;
        assert!(matches!(
            parse_stream_frame(text).unwrap(),
            StreamFrame::Ignored
        ));
    }

    #[test]
    fn klines_are_reversed_to_oldest_first() {
        let body = serde_json::json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "list": [
                    ["3", "0", "0", "0", "103", "0", "0"],
                    ["2", "0", "0", "0", "102", "0", "0"],
                    ["1", "0", "0", "0", "101", "0", "0"]
                ]
            }
        });
        let closes = parse_klines_closes(&body).unwrap();
        assert_eq!(closes, vec![101.0, 102.0, 103.0]);
    }

    #[test]
    fn exchange_error_propagates_non_zero_ret_code() {
        let body = serde_json::json!({"retCode": 10001, "retMsg": "params error"});
        let err = parse_tickers(&body).unwrap_err();
        assert!(matches!(err, DataError::Exchange { status: 10001, .. }));
    }
}
