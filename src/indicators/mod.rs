// =============================================================================
// Indicator Engine
// =============================================================================
//
// Pure, side-effect-free functions over a close-price series: Wilder RSI and
// percent momentum, plus the exhaustion/expansion classification the Rule
// Evaluator and Scorer both consult. Every public function returns
// `Option<T>` so callers are forced to handle insufficient-data scenarios.

pub mod momentum;
pub mod rsi;

pub use momentum::calculate_momentum;
pub use rsi::calculate_rsi;

/// `rsi` extreme (≥70 or ≤30) and `|momentum| > 2.0`.
pub fn is_exhaustion(rsi: f64, momentum: f64) -> bool {
    (rsi >= 70.0 || rsi <= 30.0) && momentum.abs() > 2.0
}

/// `rsi` in [40,60] and `|momentum| > 1.5`.
pub fn is_expansion(rsi: f64, momentum: f64) -> bool {
    (40.0..=60.0).contains(&rsi) && momentum.abs() > 1.5
}
