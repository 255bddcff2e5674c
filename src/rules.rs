// =============================================================================
// Rule Evaluator — early-exit gate + ordered rule set
// =============================================================================

use tracing::debug;

use crate::config::Config;
use crate::funding_tracker;
use crate::indicators::{calculate_momentum, calculate_rsi, is_exhaustion};
use crate::market_state::MarketStateStore;
use crate::types::{Bias, FundingBiasLabel, MomentumClass, Movement, SignalType, Symbol};

const MIN_PRICE_HISTORY: usize = 20;
const RSI_PERIOD: usize = 14;
const MOMENTUM_PERIOD: usize = 10;
const EARLY_EXIT_FUNDING_PCT: f64 = 0.01;
const EARLY_EXIT_RSI_HIGH: f64 = 75.0;
const EARLY_EXIT_RSI_LOW: f64 = 25.0;

/// Optional reference-asset context mixed into the evaluation when enabled.
#[derive(Debug, Clone, Copy)]
pub struct BtcContext {
    pub price: f64,
    pub funding_rate_pct: f64,
}

/// Transient evaluation input assembled fresh for each `processSymbol` call.
#[derive(Debug, Clone)]
pub struct SignalContext {
    pub symbol: Symbol,
    pub funding_rate_pct: f64,
    pub funding_delta: f64,
    pub rsi: Option<f64>,
    pub momentum: Option<f64>,
    pub price: f64,
    pub volume_24h: f64,
    pub btc: Option<BtcContext>,
}

/// A candidate alert emitted by the Rule Evaluator, still unscored and
/// un-dispatched.
#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: Symbol,
    pub signal_type: SignalType,
    pub bias: Bias,
    pub funding_rate_pct: f64,
    pub funding_delta: f64,
    pub rsi: Option<f64>,
    pub momentum: Option<f64>,
    pub price: f64,
    pub timeframe: &'static str,
    pub context: String,
    pub momentum_class: MomentumClass,
    pub funding_bias_label: FundingBiasLabel,
    pub movement: Movement,
}

pub struct RuleEvaluator<'a> {
    store: &'a MarketStateStore,
    config: &'a Config,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(store: &'a MarketStateStore, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Build the `SignalContext` for `symbol`, applying the early-exit gate.
    /// Returns `None` if any required input is missing or the gate rejects
    /// the symbol as uninteresting this tick.
    pub fn build_context(&self, symbol: &str) -> Option<SignalContext> {
        let ticker = self.store.get_market(symbol)?;
        let funding = self.store.get_funding(symbol)?;
        let prices = self.store.get_price_history(symbol);
        if prices.len() < MIN_PRICE_HISTORY {
            return None;
        }

        let rsi = calculate_rsi(&prices, RSI_PERIOD);

        if funding.rate_pct.abs() < EARLY_EXIT_FUNDING_PCT {
            let extreme = rsi.map(|v| v > EARLY_EXIT_RSI_HIGH || v < EARLY_EXIT_RSI_LOW);
            if extreme != Some(true) {
                return None;
            }
        }

        let momentum = calculate_momentum(&prices, MOMENTUM_PERIOD);
        let delta = funding_tracker::delta(self.store, symbol);

        let btc = if self.config.enable_btc_context && symbol != "BTCUSDT" {
            self.store
                .get_market("BTCUSDT")
                .zip(self.store.get_funding("BTCUSDT"))
                .map(|(t, f)| BtcContext {
                    price: t.last_price,
                    funding_rate_pct: f.rate_pct,
                })
        } else {
            None
        };

        Some(SignalContext {
            symbol: Symbol::new(symbol),
            funding_rate_pct: funding.rate_pct,
            funding_delta: delta,
            rsi,
            momentum,
            price: ticker.last_price,
            volume_24h: ticker.turnover_24h,
            btc,
        })
    }

    /// Apply the ordered rule set; the first match wins. Returns `None` if
    /// no rule fires.
    pub fn evaluate(&self, ctx: &SignalContext) -> Option<Signal> {
        let rsi = ctx.rsi?;
        let momentum = ctx.momentum.unwrap_or(0.0);
        let funding = ctx.funding_rate_pct;
        let delta = ctx.funding_delta;

        let (signal_type, bias, same_side_overcrowded) = if rsi < 30.0 && funding < -0.01 {
            (SignalType::Reversal, Bias::Long, false)
        } else if rsi > 75.0 && funding > 0.01 {
            (SignalType::Reversal, Bias::Short, false)
        } else if funding <= -0.04 && rsi <= 30.0 && momentum < -1.0 && delta < 0.0 {
            (SignalType::Reversal, Bias::Long, false)
        } else if funding >= 0.04 && rsi >= 70.0 && momentum > 1.0 && delta > 0.0 {
            (SignalType::Reversal, Bias::Short, false)
        } else if (0.005..=0.02).contains(&funding) && delta > 0.0 && momentum > 0.0 {
            (SignalType::Trend, Bias::Long, true)
        } else if (-0.02..=-0.005).contains(&funding) && delta < 0.0 && momentum < 0.0 {
            (SignalType::Trend, Bias::Short, true)
        } else if momentum < -1.0 && funding > 0.005 {
            (SignalType::Divergence, Bias::Long, false)
        } else if momentum > 1.0 && funding < -0.005 {
            (SignalType::Divergence, Bias::Short, false)
        } else {
            debug!(symbol = %ctx.symbol, "no rule matched");
            return None;
        };

        let funding_bias_label = match (bias, same_side_overcrowded) {
            (Bias::Long, false) => FundingBiasLabel::ShortOvercrowded,
            (Bias::Short, false) => FundingBiasLabel::LongOvercrowded,
            (Bias::Long, true) => FundingBiasLabel::LongOvercrowded,
            (Bias::Short, true) => FundingBiasLabel::ShortOvercrowded,
        };

        let momentum_class = if is_exhaustion(rsi, momentum) {
            MomentumClass::Exhaustion
        } else {
            MomentumClass::Expansion
        };

        // The side opposing the current momentum direction has no real
        // movement to report and falls back to a 2.0% display floor; the
        // side momentum actually moved shows its true magnitude.
        let movement = if momentum >= 0.0 {
            Movement {
                up_pct: momentum,
                down_pct: 2.0,
            }
        } else {
            Movement {
                up_pct: 2.0,
                down_pct: momentum.abs(),
            }
        };

        let context = format!(
            "{signal_type} {bias} on {symbol}: funding {funding:.4}% (Δ{delta:.4}), RSI {rsi:.2}, momentum {momentum:.2}%",
            symbol = ctx.symbol,
        );

        Some(Signal {
            symbol: ctx.symbol.clone(),
            signal_type,
            bias,
            funding_rate_pct: funding,
            funding_delta: delta,
            rsi: Some(rsi),
            momentum: ctx.momentum,
            price: ctx.price,
            timeframe: "1m",
            context,
            momentum_class,
            funding_bias_label,
            movement,
        })
    }
}
