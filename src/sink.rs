// =============================================================================
// Notification Sink — Discord-embed webhook delivery
// =============================================================================

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::DataError;
use crate::rules::Signal;
use crate::types::Bias;

/// Delivers a scored, throttle-approved [`Signal`] to an external channel.
/// Failures are logged by the caller; the Dispatch Governor never retries.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, signal: &Signal) -> Result<(), DataError>;
}

/// HTTPS POST of a Discord-embed-shaped JSON payload.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    fn build_payload(&self, signal: &Signal) -> serde_json::Value {
        let (color, circle) = match signal.bias {
            Bias::Long => (0x2ECC71, "🟢"),
            Bias::Short => (0xE74C3C, "🔴"),
        };

        let rsi = signal.rsi.unwrap_or(0.0);

        json!({
            "embeds": [{
                "title": "🎯 DYNASTY FUNDING RATE ALERTS",
                "color": color,
                "fields": [
                    { "name": "Symbol", "value": signal.symbol.as_str(), "inline": true },
                    { "name": "Timeframe", "value": signal.timeframe, "inline": true },
                    { "name": "Bias", "value": format!("{circle} {}", signal.bias), "inline": true },
                    {
                        "name": "Movement",
                        "value": format!("↑{:.2}% / ↓{:.2}%", signal.movement.up_pct, signal.movement.down_pct),
                        "inline": true
                    },
                    {
                        "name": "RSI (15m / 5m / 1m)",
                        "value": format!("{rsi:.2} / {rsi:.2} / {rsi:.2}"),
                        "inline": true
                    },
                    {
                        "name": "Funding Rate",
                        "value": format!("{:.4}%", signal.funding_rate_pct),
                        "inline": true
                    },
                    { "name": "Context", "value": signal.context.clone(), "inline": false },
                    {
                        "name": "Links",
                        "value": format!(
                            "[Chart](https://www.tradingview.com/symbols/{sym}) · [Exchange](https://www.bybit.com/trade/usdt/{sym})",
                            sym = signal.symbol.as_str()
                        ),
                        "inline": false
                    },
                ],
            }]
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), DataError> {
        let payload = self.build_payload(signal);

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DataError::Sink(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(symbol = %signal.symbol, status = %status, "webhook sink rejected payload");
            return Err(DataError::Sink(format!("webhook returned {status}")));
        }

        debug!(symbol = %signal.symbol, "signal delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
pub use test_support::MockSink;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FundingBiasLabel, MomentumClass, Movement, SignalType, Symbol};

    fn signal() -> Signal {
        Signal {
            symbol: Symbol::new("FOOUSDT"),
            signal_type: SignalType::Reversal,
            bias: Bias::Short,
            funding_rate_pct: 0.015,
            funding_delta: 0.001,
            rsi: Some(78.0),
            momentum: Some(1.2),
            price: 1.23,
            timeframe: "1m",
            context: "test context".to_string(),
            momentum_class: MomentumClass::Expansion,
            funding_bias_label: FundingBiasLabel::LongOvercrowded,
            movement: Movement {
                up_pct: 2.0,
                down_pct: 2.0,
            },
        }
    }

    #[test]
    fn payload_colors_short_bias_red() {
        let sink = WebhookSink::new("https://example.test/hook".into());
        let payload = sink.build_payload(&signal());
        assert_eq!(payload["embeds"][0]["color"], 0xE74C3C);
        assert_eq!(payload["embeds"][0]["title"], "🎯 DYNASTY FUNDING RATE ALERTS");
    }

    #[tokio::test]
    async fn mock_sink_counts_successful_deliveries() {
        let sink = test_support::MockSink::default();
        sink.deliver(&signal()).await.unwrap();
        sink.deliver(&signal()).await.unwrap();
        assert_eq!(sink.delivered_count(), 2);
    }

    #[tokio::test]
    async fn failing_mock_sink_never_increments_count() {
        let sink = test_support::MockSink::failing();
        assert!(sink.deliver(&signal()).await.is_err());
        assert_eq!(sink.delivered_count(), 0);
    }
}
