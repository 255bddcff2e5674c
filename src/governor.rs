// =============================================================================
// Dispatch Governor — per-symbol cooldown and global hourly rate limit
// =============================================================================
//
// `tryDispatch` reserves the cooldown entry and rate-window slot under the
// same lock acquisition as the check, before the sink is ever awaited, so two
// concurrent callers for the same symbol cannot both pass the check before
// either records. A failed delivery rolls the reservation back under a fresh
// lock acquisition, so a sink failure never permanently consumes throttle
// budget. Optional Redis backing follows an in-process-state-is-always-
// authoritative shape: an external store is consulted opportunistically and
// permanently dropped on its first error.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use redis::AsyncCommands;
use tracing::warn;

use crate::rules::Signal;
use crate::sink::NotificationSink;

/// Reason a candidate signal was suppressed instead of dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Cooldown,
    RateLimited,
    BelowThreshold,
    SinkFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Suppressed(SuppressReason),
}

struct RateWindow {
    count: u32,
    reset_at: chrono::DateTime<Utc>,
}

struct GovernorState {
    cooldowns: HashMap<String, chrono::DateTime<Utc>>,
    rate_window: RateWindow,
}

/// Gates signal delivery by per-symbol cooldown and a global hourly cap.
///
/// An optional external store may back both, but this implementation keeps
/// the in-process map and counter authoritative at all times and only
/// attempts to mirror state to the external store; any external-store error
/// permanently disables it for the remainder of the run (`store_disabled`).
pub struct DispatchGovernor {
    cooldown_window: chrono::Duration,
    cooldown_seconds: u64,
    max_per_hour: u32,
    state: Mutex<GovernorState>,
    store_disabled: AtomicBool,
    redis: tokio::sync::Mutex<Option<redis::aio::ConnectionManager>>,
}

impl DispatchGovernor {
    pub fn new(cooldown_seconds: u64, max_alerts_per_hour: u32) -> Self {
        Self {
            cooldown_window: chrono::Duration::seconds(cooldown_seconds as i64),
            cooldown_seconds,
            max_per_hour: max_alerts_per_hour,
            state: Mutex::new(GovernorState {
                cooldowns: HashMap::new(),
                rate_window: RateWindow {
                    count: 0,
                    reset_at: Utc::now() + chrono::Duration::hours(1),
                },
            }),
            store_disabled: AtomicBool::new(false),
            redis: tokio::sync::Mutex::new(None),
        }
    }

    /// Like [`Self::new`], additionally attempting to connect to `redis_url`
    /// for best-effort cross-process mirroring of cooldown state. A missing
    /// URL or a failed connection simply leaves the governor running
    /// in-process-only; this is never fatal at startup.
    pub async fn with_redis(
        cooldown_seconds: u64,
        max_alerts_per_hour: u32,
        redis_url: Option<&str>,
    ) -> Self {
        let governor = Self::new(cooldown_seconds, max_alerts_per_hour);

        let Some(url) = redis_url else {
            return governor;
        };

        match redis::Client::open(url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(manager) => {
                    *governor.redis.lock().await = Some(manager);
                }
                Err(e) => {
                    warn!(error = %e, "failed to connect to redis, cooldown mirroring disabled");
                    governor.store_disabled.store(true, Ordering::Relaxed);
                }
            },
            Err(e) => {
                warn!(error = %e, "invalid redis url, cooldown mirroring disabled");
                governor.store_disabled.store(true, Ordering::Relaxed);
            }
        }

        governor
    }

    /// Mirror a successful dispatch's cooldown to Redis, best-effort. Any
    /// error permanently disables further mirroring for this run -- the
    /// in-process map stays authoritative regardless.
    async fn mirror_cooldown(&self, symbol: &str) {
        if self.store_disabled.load(Ordering::Relaxed) {
            return;
        }

        let mut guard = self.redis.lock().await;
        let Some(manager) = guard.as_mut() else {
            return;
        };

        let key = format!("funding-signal-engine:cooldown:{symbol}");
        let result: redis::RedisResult<()> = manager
            .set_ex(&key, true, self.cooldown_seconds.max(1))
            .await;

        if let Err(e) = result {
            warn!(error = %e, "redis cooldown mirror failed, disabling for remainder of run");
            self.store_disabled.store(true, Ordering::Relaxed);
            *guard = None;
        }
    }

    /// `meets_threshold` must already be computed by the scorer; this method
    /// never reconsults the score itself. `check -> reserve -> deliver ->
    /// confirm/rollback`: the cooldown entry and rate-window increment are
    /// reserved under the same lock acquisition as the check, *before* the
    /// sink is awaited, so a second caller for the same symbol (streaming
    /// trigger racing the periodic sweep, per spec) cannot also pass the
    /// check before this call records. A failed delivery rolls the
    /// reservation back under a fresh lock acquisition.
    pub async fn try_dispatch(
        &self,
        signal: &Signal,
        meets_threshold: bool,
        sink: &dyn NotificationSink,
    ) -> DispatchOutcome {
        if !meets_threshold {
            return DispatchOutcome::Suppressed(SuppressReason::BelowThreshold);
        }

        let now = Utc::now();
        let reserved_expiry = now + self.cooldown_window;
        let reserved_window_reset_at;
        {
            let mut state = self.state.lock();

            if let Some(expiry) = state.cooldowns.get(signal.symbol.as_str()) {
                if *expiry > now {
                    return DispatchOutcome::Suppressed(SuppressReason::Cooldown);
                }
            }

            if now >= state.rate_window.reset_at {
                state.rate_window.count = 0;
                state.rate_window.reset_at = now + chrono::Duration::hours(1);
            }
            if state.rate_window.count >= self.max_per_hour {
                return DispatchOutcome::Suppressed(SuppressReason::RateLimited);
            }

            // Reserve before releasing the lock: the only way a racing
            // caller can observe this symbol/window as available is if this
            // call's delivery later fails and rolls the reservation back.
            state
                .cooldowns
                .insert(signal.symbol.to_string(), reserved_expiry);
            state.rate_window.count += 1;
            reserved_window_reset_at = state.rate_window.reset_at;
        }

        if sink.deliver(signal).await.is_err() {
            warn!(symbol = %signal.symbol, "sink delivery failed, rolling back reserved cooldown and rate budget");

            let mut state = self.state.lock();
            // Only undo this call's own reservation -- a concurrent caller
            // may have already reserved a fresh cooldown/count for this
            // symbol (e.g. after an hourly rollover) since we released the
            // lock above.
            if state.cooldowns.get(signal.symbol.as_str()) == Some(&reserved_expiry) {
                state.cooldowns.remove(signal.symbol.as_str());
            }
            if state.rate_window.reset_at == reserved_window_reset_at && state.rate_window.count > 0
            {
                state.rate_window.count -= 1;
            }

            return DispatchOutcome::Suppressed(SuppressReason::SinkFailure);
        }

        self.mirror_cooldown(signal.symbol.as_str()).await;

        DispatchOutcome::Sent
    }

    /// Permanently disables reliance on the optional external store for the
    /// remainder of the run. In-process state remains authoritative either
    /// way; this flag only matters for components that mirror state
    /// best-effort to Redis and want to stop trying after the first error.
    pub fn disable_external_store(&self) {
        self.store_disabled.store(true, Ordering::Relaxed);
    }

    pub fn external_store_disabled(&self) -> bool {
        self.store_disabled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;
    use crate::types::{Bias, FundingBiasLabel, MomentumClass, Movement, SignalType, Symbol};

    fn signal(symbol: &str) -> Signal {
        Signal {
            symbol: Symbol::new(symbol),
            signal_type: SignalType::Reversal,
            bias: Bias::Long,
            funding_rate_pct: -0.05,
            funding_delta: -0.002,
            rsi: Some(25.0),
            momentum: Some(-1.5),
            price: 1.0,
            timeframe: "1m",
            context: String::new(),
            momentum_class: MomentumClass::Expansion,
            funding_bias_label: FundingBiasLabel::ShortOvercrowded,
            movement: Movement {
                up_pct: 2.0,
                down_pct: 1.5,
            },
        }
    }

    #[tokio::test]
    async fn with_redis_none_behaves_like_in_process_only() {
        let governor = DispatchGovernor::with_redis(300, 20, None).await;
        assert!(!governor.external_store_disabled());
        let sink = MockSink::default();
        let outcome = governor.try_dispatch(&signal("EUSDT"), true, &sink).await;
        assert_eq!(outcome, DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn with_redis_unreachable_url_disables_mirroring_but_still_dispatches() {
        let governor =
            DispatchGovernor::with_redis(300, 20, Some("redis://127.0.0.1:1/0")).await;
        assert!(governor.external_store_disabled());
        let sink = MockSink::default();
        let outcome = governor.try_dispatch(&signal("FUSDT"), true, &sink).await;
        assert_eq!(outcome, DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn below_threshold_is_suppressed_without_touching_sink() {
        let governor = DispatchGovernor::new(300, 20);
        let sink = MockSink::default();
        let outcome = governor.try_dispatch(&signal("AUSDT"), false, &sink).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Suppressed(SuppressReason::BelowThreshold)
        );
        assert_eq!(sink.delivered_count(), 0);
    }

    #[tokio::test]
    async fn second_dispatch_within_cooldown_is_suppressed() {
        let governor = DispatchGovernor::new(300, 20);
        let sink = MockSink::default();
        let first = governor.try_dispatch(&signal("BUSDT"), true, &sink).await;
        assert_eq!(first, DispatchOutcome::Sent);

        let second = governor.try_dispatch(&signal("BUSDT"), true, &sink).await;
        assert_eq!(
            second,
            DispatchOutcome::Suppressed(SuppressReason::Cooldown)
        );
        assert_eq!(sink.delivered_count(), 1);
    }

    #[tokio::test]
    async fn rate_limit_caps_distinct_symbols_within_the_hour() {
        let governor = DispatchGovernor::new(300, 2);
        let sink = MockSink::default();

        let a = governor.try_dispatch(&signal("AUSDT"), true, &sink).await;
        let b = governor.try_dispatch(&signal("BUSDT"), true, &sink).await;
        let c = governor.try_dispatch(&signal("CUSDT"), true, &sink).await;

        assert_eq!(a, DispatchOutcome::Sent);
        assert_eq!(b, DispatchOutcome::Sent);
        assert_eq!(c, DispatchOutcome::Suppressed(SuppressReason::RateLimited));
        assert_eq!(sink.delivered_count(), 2);
    }

    #[tokio::test]
    async fn sink_failure_does_not_consume_cooldown_or_rate_budget() {
        let governor = DispatchGovernor::new(300, 20);
        let sink = MockSink::failing();

        let outcome = governor.try_dispatch(&signal("DUSDT"), true, &sink).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Suppressed(SuppressReason::SinkFailure)
        );

        // A retry immediately after should be allowed to proceed (no
        // cooldown / rate budget was consumed by the failed attempt).
        let sink2 = MockSink::default();
        let retry = governor.try_dispatch(&signal("DUSDT"), true, &sink2).await;
        assert_eq!(retry, DispatchOutcome::Sent);
    }

    // The streaming trigger and the periodic sweep can both call
    // `process_symbol` for the same symbol concurrently (spec §9 note c);
    // these exercise that race directly rather than only sequentially. The
    // sink's artificial delay widens the window between reserve and confirm
    // so both `try_dispatch` calls are genuinely in flight at once.

    #[tokio::test]
    async fn concurrent_dispatch_for_same_symbol_sends_exactly_once() {
        let governor = DispatchGovernor::new(300, 20);
        let sink = MockSink::with_delay(20);

        let (a, b) = tokio::join!(
            governor.try_dispatch(&signal("RUSDT"), true, &sink),
            governor.try_dispatch(&signal("RUSDT"), true, &sink),
        );

        let sent = [a, b]
            .into_iter()
            .filter(|o| *o == DispatchOutcome::Sent)
            .count();
        assert_eq!(sent, 1);
        assert_eq!(sink.delivered_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_dispatch_across_symbols_never_exceeds_rate_cap() {
        let governor = DispatchGovernor::new(300, 2);
        let sink = MockSink::with_delay(20);

        let (a, b, c) = tokio::join!(
            governor.try_dispatch(&signal("XUSDT"), true, &sink),
            governor.try_dispatch(&signal("YUSDT"), true, &sink),
            governor.try_dispatch(&signal("ZUSDT"), true, &sink),
        );

        let sent = [a, b, c]
            .into_iter()
            .filter(|o| *o == DispatchOutcome::Sent)
            .count();
        assert_eq!(sent, 2);
        assert_eq!(sink.delivered_count(), 2);
    }
}
