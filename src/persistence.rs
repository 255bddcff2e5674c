// =============================================================================
// Persistence — optional, fire-and-forget append-only log
// =============================================================================
//
// Two tables: `signals` (every dispatched signal) and `funding_snapshots`
// (a lighter per-evaluation record). Modeled as `Option<Store>` per the
// design notes: every call site handles "present and healthy" and "absent
// or degraded" identically, since persistence never blocks dispatch.
// =============================================================================

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;

use crate::rules::Signal;

/// Optional durable store for dispatched signals and funding snapshots.
/// `None` when `POSTGRES_URL` is not configured or the initial connection
/// failed; every write path treats that identically to a live pool that
/// later errors on an individual insert.
pub struct PersistenceStore {
    pool: Option<PgPool>,
}

impl PersistenceStore {
    /// A store with persistence disabled, for callers that already know no
    /// database is configured (e.g. tests).
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    /// Connect if `postgres_url` is set. Connection failure is logged and
    /// downgrades to the disabled state rather than propagating -- this
    /// component is never on the fatal-at-startup path.
    pub async fn connect(postgres_url: Option<&str>) -> Self {
        let Some(url) = postgres_url else {
            return Self { pool: None };
        };

        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => Self { pool: Some(pool) },
            Err(e) => {
                warn!(error = %e, "failed to connect to postgres, persistence disabled for this run");
                Self { pool: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Append a dispatched signal. Best-effort: logs and returns on any
    /// failure, never propagates.
    pub async fn record_signal(&self, signal: &Signal, score: f64) {
        let Some(pool) = &self.pool else { return };

        let result = sqlx::query(
            "INSERT INTO signals \
             (symbol, type, bias, funding_rate_pct, funding_delta, rsi, score, price, timeframe, context, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())",
        )
        .bind(signal.symbol.as_str())
        .bind(signal.signal_type.to_string())
        .bind(signal.bias.to_string())
        .bind(signal.funding_rate_pct)
        .bind(signal.funding_delta)
        .bind(signal.rsi)
        .bind(score)
        .bind(signal.price)
        .bind(signal.timeframe)
        .bind(signal.context.clone())
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!(symbol = %signal.symbol, error = %e, "failed to persist signal");
        }
    }

    /// Append a funding snapshot taken during a `processSymbol` evaluation,
    /// independent of whether a signal fired.
    pub async fn record_funding_snapshot(
        &self,
        symbol: &str,
        funding_rate_pct: f64,
        price: f64,
        volume_24h: f64,
        rsi: Option<f64>,
    ) {
        let Some(pool) = &self.pool else { return };

        let result = sqlx::query(
            "INSERT INTO funding_snapshots \
             (symbol, funding_rate_pct, price, volume_24h, rsi, created_at) \
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(symbol)
        .bind(funding_rate_pct)
        .bind(price)
        .bind(volume_24h)
        .bind(rsi)
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!(symbol, error = %e, "failed to persist funding snapshot");
        }
    }
}
