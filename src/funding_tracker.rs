// =============================================================================
// Funding Tracker — derived views over FundingHistory
// =============================================================================

use crate::market_state::{Funding, MarketStateStore};

/// `latest − previous` (0.0 if fewer than two entries in history).
pub fn delta(store: &MarketStateStore, symbol: &str) -> f64 {
    let history = store.get_funding_history(symbol);
    delta_from_history(&history)
}

/// `delta / (t_latest − t_previous)` in seconds (0.0 if the time delta is
/// ≤ 0 or fewer than two entries are present).
pub fn velocity(store: &MarketStateStore, symbol: &str) -> f64 {
    let history = store.get_funding_history(symbol);
    velocity_from_history(&history)
}

fn delta_from_history(history: &[Funding]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let latest = history[history.len() - 1];
    let previous = history[history.len() - 2];
    latest.rate_pct - previous.rate_pct
}

fn velocity_from_history(history: &[Funding]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let latest = history[history.len() - 1];
    let previous = history[history.len() - 2];
    let seconds = (latest.observed_at - previous.observed_at).num_milliseconds() as f64 / 1000.0;
    if seconds <= 0.0 {
        return 0.0;
    }
    (latest.rate_pct - previous.rate_pct) / seconds
}
