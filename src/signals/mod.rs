// =============================================================================
// Signals Module
// =============================================================================
//
// Weighted ensemble scoring over the five factors the Rule Evaluator's
// output carries: funding extremity, funding delta, RSI/momentum
// confluence, volume spike, and BTC context.

pub mod scorer;

pub use scorer::{ScoringResult, WeightedScorer};
