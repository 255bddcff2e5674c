// =============================================================================
// Funding Signal Engine — Main Entry Point
// =============================================================================
//
// Streaming Transport + Exchange Client -> Market State Store -> (on every
// update) Orchestrator -> Rule Evaluator -> Scorer -> Dispatch Governor ->
// notification sink. A periodic priority-bucketed sweep covers symbols that
// haven't produced a fresh streaming update recently.
// =============================================================================

mod config;
mod error;
mod exchange;
mod funding_tracker;
mod governor;
mod indicators;
mod market_state;
mod orchestrator;
mod persistence;
mod rules;
mod signals;
mod sink;
mod types;
mod universe;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::exchange::client::ExchangeClient;
use crate::exchange::stream::StreamingTransport;
use crate::governor::DispatchGovernor;
use crate::market_state::MarketStateStore;
use crate::orchestrator::Orchestrator;
use crate::persistence::PersistenceStore;
use crate::sink::{NotificationSink, WebhookSink};
use crate::universe::UniverseLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("funding signal engine starting up");

    // ── 1. Configuration ──────────────────────────────────────────────────
    let config = Arc::new(Config::from_env()?);

    // ── 2. Exchange client & universe ─────────────────────────────────────
    let exchange = Arc::new(ExchangeClient::new(config.bybit_testnet));

    let universe = {
        let loader = UniverseLoader::new(&exchange, &config);
        loader.load_universe().await?
    };

    if universe.is_empty() {
        warn!("universe loader returned zero symbols, nothing to monitor");
    }
    info!(count = universe.len(), "universe loaded");

    // ── 3. Market state store, seeded from REST ──────────────────────────
    let store = Arc::new(MarketStateStore::new(exchange.clone()));
    for symbol in &universe {
        store.register_symbol(symbol);
    }
    store.init_universe(&universe).await;

    // ── 4. Streaming transport, subscribed to every monitored symbol ─────
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut stream = StreamingTransport::new(config.bybit_testnet);
    let funding_rx = stream.funding_stream();
    let ticker_rx = stream.ticker_stream();
    for symbol in &universe {
        stream.subscribe(symbol);
    }
    let stream_handle = tokio::spawn(stream.run(shutdown_rx.clone()));

    // ── 5. Dispatch governor, sink, optional persistence ──────────────────
    let governor = Arc::new(
        DispatchGovernor::with_redis(
            config.cooldown_seconds,
            config.max_alerts_per_hour,
            config.redis_url.as_deref(),
        )
        .await,
    );
    let sink: Arc<dyn NotificationSink> = Arc::new(WebhookSink::new(config.notification_url.clone()));
    let persistence = Arc::new(PersistenceStore::connect(config.postgres_url.as_deref()).await);
    if persistence.is_enabled() {
        info!("persistence enabled");
    } else {
        info!("persistence disabled (no POSTGRES_URL or connection failed)");
    }

    // ── 6. Orchestrator: streaming trigger + periodic sweep ───────────────
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        config.clone(),
        governor.clone(),
        sink.clone(),
        persistence.clone(),
    ));

    let streaming_task = tokio::spawn(
        orchestrator
            .clone()
            .run_streaming_trigger(funding_rx, ticker_rx),
    );
    let sweep_task = tokio::spawn(orchestrator.clone().run_periodic_sweep(shutdown_rx.clone()));

    info!("all subsystems running, press Ctrl+C to stop");

    // ── 7. Graceful shutdown ──────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, draining in-flight work");

    // Signal every loop cooperatively and await (never abort) its handle:
    // the streaming transport finishes or drops its current connection and
    // closes the funding/ticker channels, which in turn lets the streaming
    // trigger's `process_symbol` calls finish and the task exit on its own;
    // the periodic sweep finishes whatever batch it is mid-run before
    // checking the signal.
    let _ = shutdown_tx.send(true);

    for (name, handle) in [
        ("streaming transport", stream_handle),
        ("streaming trigger", streaming_task),
        ("periodic sweep", sweep_task),
    ] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "task panicked during shutdown");
        }
    }

    info!("funding signal engine shut down complete");
    Ok(())
}
