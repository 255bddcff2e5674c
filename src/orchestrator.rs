// =============================================================================
// Scheduler / Orchestrator — streaming trigger + periodic priority sweep
// =============================================================================
//
// Two concurrent triggers feed `process_symbol`: every streaming funding or
// ticker update, and a 5-minute priority-bucketed sweep over the whole
// universe. The governor's idempotence makes the two paths safe to overlap.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::Config;
use crate::exchange::wire::{FundingUpdate, PriceUpdate};
use crate::funding_tracker;
use crate::governor::{DispatchGovernor, DispatchOutcome};
use crate::indicators::calculate_rsi;
use crate::market_state::MarketStateStore;
use crate::persistence::PersistenceStore;
use crate::rules::RuleEvaluator;
use crate::signals::WeightedScorer;
use crate::sink::NotificationSink;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const HIGH_PRIORITY_BATCH: usize = 5;
const NORMAL_PRIORITY_BATCH: usize = 10;
const INTER_BATCH_DELAY: Duration = Duration::from_millis(1000);
const HIGH_PRIORITY_FUNDING_PCT: f64 = 0.03;
const HIGH_PRIORITY_RSI_HIGH: f64 = 75.0;
const HIGH_PRIORITY_RSI_LOW: f64 = 25.0;
const HIGH_PRIORITY_VELOCITY: f64 = 0.0001;
const RSI_PERIOD: usize = 14;

/// Owns the evaluator -> scorer -> governor -> sink pipeline and the two
/// triggers that feed it.
pub struct Orchestrator {
    store: Arc<MarketStateStore>,
    config: Arc<Config>,
    governor: Arc<DispatchGovernor>,
    scorer: WeightedScorer,
    sink: Arc<dyn NotificationSink>,
    persistence: Arc<PersistenceStore>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<MarketStateStore>,
        config: Arc<Config>,
        governor: Arc<DispatchGovernor>,
        sink: Arc<dyn NotificationSink>,
        persistence: Arc<PersistenceStore>,
    ) -> Self {
        let scorer = WeightedScorer::new(config.min_score_threshold);
        Self {
            store,
            config,
            governor,
            scorer,
            sink,
            persistence,
        }
    }

    /// `cooldown check -> rate-limit check -> validateSignal -> threshold
    /// check -> persistence (best-effort) -> sink delivery -> cooldown set
    /// and rate-limit increment` (the last two happen inside the governor,
    /// only on successful delivery).
    pub async fn process_symbol(&self, symbol: &str) {
        let evaluator = RuleEvaluator::new(&self.store, &self.config);

        let Some(ctx) = evaluator.build_context(symbol) else {
            return;
        };

        let Some(signal) = evaluator.evaluate(&ctx) else {
            return;
        };

        let scoring = self.scorer.score(
            &signal,
            ctx.btc.map(|b| b.funding_rate_pct),
            ctx.volume_24h,
        );

        self.persistence
            .record_funding_snapshot(symbol, ctx.funding_rate_pct, ctx.price, ctx.volume_24h, ctx.rsi)
            .await;

        let outcome = self
            .governor
            .try_dispatch(&signal, scoring.meets_threshold, self.sink.as_ref())
            .await;

        if outcome == DispatchOutcome::Sent {
            self.persistence.record_signal(&signal, scoring.score).await;
            info!(symbol, score = scoring.score, bias = %signal.bias, "signal dispatched");
        } else {
            debug!(symbol, ?outcome, score = scoring.score, "signal not dispatched");
        }
    }

    /// Drain the funding/ticker update channels, invoking `process_symbol`
    /// for the affected symbol on every emission, until both channels close
    /// (signalling shutdown).
    pub async fn run_streaming_trigger(
        self: Arc<Self>,
        mut funding_rx: mpsc::UnboundedReceiver<FundingUpdate>,
        mut ticker_rx: mpsc::UnboundedReceiver<PriceUpdate>,
    ) {
        loop {
            tokio::select! {
                funding = funding_rx.recv() => {
                    match funding {
                        Some(update) => {
                            let symbol = update.symbol.clone();
                            self.store.ingest_funding(update);
                            self.process_symbol(&symbol).await;
                        }
                        None => break,
                    }
                }
                ticker = ticker_rx.recv() => {
                    match ticker {
                        Some(update) => {
                            let symbol = update.symbol.clone();
                            self.store.ingest_ticker(update);
                            self.process_symbol(&symbol).await;
                        }
                        None => break,
                    }
                }
            }
        }
        info!("streaming trigger channels closed, exiting");
    }

    /// Every `SWEEP_INTERVAL`, partition the universe into high/normal
    /// priority buckets and evaluate each in batches with a fixed
    /// inter-batch delay, bounding concurrent REST/indicator load. Exits once
    /// `shutdown` observes `true`, letting the sweep currently in flight
    /// finish before returning.
    pub async fn run_periodic_sweep(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_sweep_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("periodic sweep shut down");
    }

    async fn run_sweep_once(&self) {
        let symbols = self.store.get_all_symbols();
        let (high, normal) = self.partition_by_priority(&symbols);

        info!(high = high.len(), normal = normal.len(), "periodic sweep starting");

        self.run_batches(&high, HIGH_PRIORITY_BATCH).await;
        self.run_batches(&normal, NORMAL_PRIORITY_BATCH).await;
    }

    async fn run_batches(&self, symbols: &[String], batch_size: usize) {
        for batch in symbols.chunks(batch_size) {
            let futures = batch.iter().map(|s| self.process_symbol(s));
            futures_util::future::join_all(futures).await;
            tokio::time::sleep(INTER_BATCH_DELAY).await;
        }
    }

    fn partition_by_priority(&self, symbols: &[String]) -> (Vec<String>, Vec<String>) {
        let mut high = Vec::new();
        let mut normal = Vec::new();

        for symbol in symbols {
            let is_high = self.is_high_priority(symbol);
            if is_high {
                high.push(symbol.clone());
            } else {
                normal.push(symbol.clone());
            }
        }

        (high, normal)
    }

    fn is_high_priority(&self, symbol: &str) -> bool {
        let Some(funding) = self.store.get_funding(symbol) else {
            return false;
        };
        if funding.rate_pct.abs() >= HIGH_PRIORITY_FUNDING_PCT {
            return true;
        }

        let prices = self.store.get_price_history(symbol);
        if let Some(rsi) = calculate_rsi(&prices, RSI_PERIOD) {
            if rsi >= HIGH_PRIORITY_RSI_HIGH || rsi <= HIGH_PRIORITY_RSI_LOW {
                return true;
            }
        }

        funding_tracker::velocity(&self.store, symbol).abs() > HIGH_PRIORITY_VELOCITY
    }
}
