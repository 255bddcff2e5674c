// =============================================================================
// Streaming Transport — WebSocket connection lifecycle and resubscription
// =============================================================================
//
// Reconnect-with-fixed-backoff and full-resubscribe-on-reconnect, covering
// the funding/ticker topic pair this pipeline consumes.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::exchange::wire::{parse_stream_frame, FundingUpdate, PriceUpdate, StreamFrame};

const MAINNET_WS_URL: &str = "wss://stream.bybit.com/v5/public/linear";
const TESTNET_WS_URL: &str = "wss://stream-testnet.bybit.com/v5/public/linear";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection lifecycle state, observable for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Owns the single WebSocket connection, subscription intent, and the two
/// fan-out channels consumers read from. Reconnects transparently; on
/// reconnect, every symbol subscribed so far is resubscribed before the
/// connection is considered ready again.
pub struct StreamingTransport {
    url: String,
    state: Arc<RwLock<TransportState>>,
    subscriptions: Arc<RwLock<HashSet<String>>>,
    funding_tx: mpsc::UnboundedSender<FundingUpdate>,
    funding_rx: Option<mpsc::UnboundedReceiver<FundingUpdate>>,
    ticker_tx: mpsc::UnboundedSender<PriceUpdate>,
    ticker_rx: Option<mpsc::UnboundedReceiver<PriceUpdate>>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Message>>,
}

impl StreamingTransport {
    pub fn new(testnet: bool) -> Self {
        let (funding_tx, funding_rx) = mpsc::unbounded_channel();
        let (ticker_tx, ticker_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            url: if testnet {
                TESTNET_WS_URL.to_string()
            } else {
                MAINNET_WS_URL.to_string()
            },
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
            funding_tx,
            funding_rx: Some(funding_rx),
            ticker_tx,
            ticker_rx: Some(ticker_rx),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        }
    }

    pub fn state(&self) -> TransportState {
        *self.state.read()
    }

    /// Take the funding-update receiver. May only be called once.
    pub fn funding_stream(&mut self) -> mpsc::UnboundedReceiver<FundingUpdate> {
        self.funding_rx
            .take()
            .expect("funding_stream() already taken")
    }

    /// Take the ticker-update receiver. May only be called once.
    pub fn ticker_stream(&mut self) -> mpsc::UnboundedReceiver<PriceUpdate> {
        self.ticker_rx.take().expect("ticker_stream() already taken")
    }

    /// Register intent to subscribe to `funding.<symbol>` and
    /// `tickers.<symbol>`. Idempotent: a symbol already subscribed sends no
    /// duplicate subscribe frame. If the connection is up the subscribe is
    /// sent immediately; otherwise it is picked up on the next (re)connect.
    pub fn subscribe(&self, symbol: &str) {
        let mut subs = self.subscriptions.write();
        if !subs.insert(symbol.to_string()) {
            return;
        }
        drop(subs);

        if self.state() == TransportState::Connected {
            self.send_subscribe(std::slice::from_ref(&symbol.to_string()));
        }
    }

    fn send_subscribe(&self, symbols: &[String]) {
        let args: Vec<String> = symbols
            .iter()
            .flat_map(|s| vec![format!("funding.{s}"), format!("tickers.{s}")])
            .collect();
        let frame = serde_json::json!({ "op": "subscribe", "args": args });
        let _ = self.outbound_tx.send(Message::Text(frame.to_string()));
    }

    /// Run the connection loop, reconnecting with a fixed backoff on every
    /// disconnect, until `shutdown` observes `true`. On shutdown the current
    /// connection is closed, the state is set to `Closing`, and `run`
    /// returns -- dropping `self` closes the funding/ticker channels so
    /// `Orchestrator::run_streaming_trigger` exits on its next recv.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut outbound_rx = self
            .outbound_rx
            .take()
            .expect("run() already called");

        while !*shutdown.borrow() {
            *self.state.write() = TransportState::Connecting;
            info!(url = %self.url, "connecting to exchange stream");

            tokio::select! {
                connected = tokio_tungstenite::connect_async(&self.url) => {
                    match connected {
                        Ok((ws, _response)) => {
                            *self.state.write() = TransportState::Connected;
                            info!("stream connected, resubscribing to all tracked symbols");

                            let symbols: Vec<String> =
                                self.subscriptions.read().iter().cloned().collect();
                            if !symbols.is_empty() {
                                self.send_subscribe(&symbols);
                            }

                            self.drive_connection(ws, &mut outbound_rx, &mut shutdown).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "stream connect failed");
                        }
                    }
                }
                _ = shutdown.changed() => {}
            }

            if *shutdown.borrow() {
                break;
            }

            *self.state.write() = TransportState::Disconnected;
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                _ = shutdown.changed() => {}
            }
        }

        *self.state.write() = TransportState::Closing;
        info!("streaming transport shut down");
    }

    async fn drive_connection(
        &self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let (mut write, mut read) = ws.split();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
                _ = heartbeat.tick() => {
                    let ping = serde_json::json!({"op": "ping"}).to_string();
                    if write.send(Message::Text(ping)).await.is_err() {
                        warn!("heartbeat send failed, dropping connection");
                        return;
                    }
                }
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(msg) => {
                            if write.send(msg).await.is_err() {
                                warn!("outbound send failed, dropping connection");
                                return;
                            }
                        }
                        None => return,
                    }
                }
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("stream closed by exchange");
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "stream read error");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match parse_stream_frame(text) {
            Ok(StreamFrame::Funding(update)) => {
                let _ = self.funding_tx.send(update);
            }
            Ok(StreamFrame::Ticker(update)) => {
                let _ = self.ticker_tx.send(update);
            }
            Ok(StreamFrame::Ignored) => {}
            Err(e) => {
                debug!(error = %e, frame = text, "discarding malformed stream frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_is_idempotent_against_duplicate_intent() {
        let transport = StreamingTransport::new(false);
        transport.subscribe("BTCUSDT");
        transport.subscribe("BTCUSDT");
        assert_eq!(transport.subscriptions.read().len(), 1);
    }

    #[test]
    fn starts_disconnected() {
        let transport = StreamingTransport::new(false);
        assert_eq!(transport.state(), TransportState::Disconnected);
    }

    #[test]
    fn ws_url_switches_on_testnet_flag() {
        let main = StreamingTransport::new(false);
        let test = StreamingTransport::new(true);
        assert_eq!(main.url, MAINNET_WS_URL);
        assert_eq!(test.url, TESTNET_WS_URL);
    }
}
