// =============================================================================
// Scorer — weighted 0-100 score over five factors
// =============================================================================
//
// Weighted average of five fixed sub-scores: funding extremity, funding
// delta, RSI/momentum confluence, volume spike (placeholder), and BTC
// context.

use serde::{Deserialize, Serialize};

use crate::rules::Signal;

const WEIGHT_FUNDING_EXTREMITY: f64 = 40.0;
const WEIGHT_FUNDING_DELTA: f64 = 20.0;
const WEIGHT_RSI_MOMENTUM: f64 = 20.0;
const WEIGHT_VOLUME_SPIKE: f64 = 10.0;
const WEIGHT_BTC_CONTEXT: f64 = 10.0;

/// Result of scoring a candidate [`Signal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    pub score: f64,
    pub meets_threshold: bool,
}

/// Stateless weighted scorer. Holds only the configured pass threshold.
pub struct WeightedScorer {
    min_score_threshold: f64,
}

impl WeightedScorer {
    pub fn new(min_score_threshold: f64) -> Self {
        Self {
            min_score_threshold,
        }
    }

    pub fn score(&self, signal: &Signal, btc_funding_rate_pct: Option<f64>, volume_24h: f64) -> ScoringResult {
        let funding_sub = funding_extremity_score(signal.funding_rate_pct);
        let delta_sub = funding_delta_score(signal.funding_delta, signal.funding_rate_pct);
        let rsi_momentum_sub = rsi_momentum_score(signal.rsi, signal.momentum);
        let volume_sub = volume_spike_score(volume_24h);
        let btc_sub = btc_context_score(btc_funding_rate_pct);

        let weighted_sum = funding_sub * WEIGHT_FUNDING_EXTREMITY
            + delta_sub * WEIGHT_FUNDING_DELTA
            + rsi_momentum_sub * WEIGHT_RSI_MOMENTUM
            + volume_sub * WEIGHT_VOLUME_SPIKE
            + btc_sub * WEIGHT_BTC_CONTEXT;

        let score = round2(weighted_sum / 100.0);

        ScoringResult {
            score,
            meets_threshold: score >= self.min_score_threshold,
        }
    }
}

fn funding_extremity_score(funding_rate_pct: f64) -> f64 {
    let abs_funding = funding_rate_pct.abs();
    if abs_funding >= 0.04 {
        100.0
    } else if abs_funding >= 0.03 {
        90.0
    } else if abs_funding >= 0.02 {
        75.0
    } else if abs_funding >= 0.015 {
        60.0
    } else if abs_funding >= 0.01 {
        45.0
    } else if abs_funding >= 0.005 {
        30.0
    } else if abs_funding >= 0.002 {
        15.0
    } else {
        0.0
    }
}

fn funding_delta_score(delta: f64, funding_rate_pct: f64) -> f64 {
    if delta == 0.0 {
        return 50.0;
    }

    let abs_delta = delta.abs();
    if abs_delta >= 0.01 {
        100.0
    } else if abs_delta >= 0.005 {
        85.0
    } else if abs_delta >= 0.002 {
        70.0
    } else if abs_delta >= 0.001 {
        55.0
    } else if delta.signum() == funding_rate_pct.signum() {
        (60.0 + abs_delta * 10_000.0).min(100.0)
    } else {
        40.0
    }
}

fn rsi_momentum_score(rsi: Option<f64>, momentum: Option<f64>) -> f64 {
    let (Some(rsi), Some(momentum)) = (rsi, momentum) else {
        return 50.0;
    };

    if (rsi >= 70.0 && momentum > 0.0) || (rsi <= 30.0 && momentum < 0.0) {
        100.0
    } else if momentum.abs() > 2.0 && (40.0..=60.0).contains(&rsi) {
        85.0
    } else if (rsi >= 60.0 && momentum > 1.0) || (rsi <= 40.0 && momentum < -1.0) {
        70.0
    } else if momentum.abs() > 0.5 {
        50.0
    } else {
        30.0
    }
}

fn volume_spike_score(volume_24h: f64) -> f64 {
    if volume_24h > 0.0 {
        60.0
    } else {
        50.0
    }
}

fn btc_context_score(btc_funding_rate_pct: Option<f64>) -> f64 {
    let Some(funding) = btc_funding_rate_pct else {
        return 50.0;
    };

    let abs_funding = funding.abs();
    if abs_funding >= 0.02 {
        80.0
    } else if abs_funding >= 0.01 {
        65.0
    } else if abs_funding >= 0.005 {
        55.0
    } else {
        0.0
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bias, FundingBiasLabel, MomentumClass, Movement, SignalType, Symbol};

    fn signal(funding: f64, delta: f64, rsi: f64, momentum: f64) -> Signal {
        Signal {
            symbol: Symbol::new("FOOUSDT"),
            signal_type: SignalType::Reversal,
            bias: Bias::Short,
            funding_rate_pct: funding,
            funding_delta: delta,
            rsi: Some(rsi),
            momentum: Some(momentum),
            price: 1.0,
            timeframe: "1m",
            context: String::new(),
            momentum_class: MomentumClass::Expansion,
            funding_bias_label: FundingBiasLabel::LongOvercrowded,
            movement: Movement {
                up_pct: 2.0,
                down_pct: 2.0,
            },
        }
    }

    #[test]
    fn score_is_always_in_bounds() {
        let scorer = WeightedScorer::new(75.0);
        let s = signal(0.015, 0.001, 78.0, 1.2);
        let result = scorer.score(&s, None, 5_000_000.0);
        assert!((0.0..=100.0).contains(&result.score));
    }

    #[test]
    fn funding_extremity_steps_are_inclusive_descending() {
        assert_eq!(funding_extremity_score(0.04), 100.0);
        assert_eq!(funding_extremity_score(0.039), 90.0);
        assert_eq!(funding_extremity_score(0.015), 60.0);
        assert_eq!(funding_extremity_score(0.0001), 0.0);
    }

    #[test]
    fn zero_delta_scores_neutral_fifty() {
        assert_eq!(funding_delta_score(0.0, 0.02), 50.0);
    }

    #[test]
    fn sub_threshold_delta_rewards_matching_sign() {
        // |delta| below 0.001, same sign as funding.
        let score = funding_delta_score(0.0003, 0.01);
        assert_eq!(score, 63.0);
    }

    #[test]
    fn sub_threshold_delta_penalizes_opposite_sign() {
        let score = funding_delta_score(-0.0003, 0.01);
        assert_eq!(score, 40.0);
    }

    #[test]
    fn rsi_momentum_confluence_tops_out_at_100() {
        assert_eq!(rsi_momentum_score(Some(78.0), Some(1.2)), 100.0);
        assert_eq!(rsi_momentum_score(Some(25.0), Some(-1.5)), 100.0);
    }

    #[test]
    fn rsi_momentum_missing_inputs_default_to_50() {
        assert_eq!(rsi_momentum_score(None, Some(1.0)), 50.0);
        assert_eq!(rsi_momentum_score(Some(50.0), None), 50.0);
    }

    #[test]
    fn rsi_momentum_falls_through_to_else_bucket() {
        // RSI=55, momentum=0.4: none of the named conditions fire.
        assert_eq!(rsi_momentum_score(Some(55.0), Some(0.4)), 30.0);
    }

    #[test]
    fn btc_context_missing_defaults_to_50() {
        assert_eq!(btc_context_score(None), 50.0);
    }

    #[test]
    fn meets_threshold_uses_configured_minimum() {
        let scorer = WeightedScorer::new(75.0);
        let s = signal(-0.05, -0.002, 25.0, -1.5);
        let result = scorer.score(&s, None, 5_000_000.0);
        assert!(result.score >= 75.0);
        assert!(result.meets_threshold);
    }

    #[test]
    fn below_threshold_signal_does_not_meet_threshold() {
        let scorer = WeightedScorer::new(75.0);
        let s = signal(0.012, 0.001, 55.0, 0.4);
        let result = scorer.score(&s, None, 5_000_000.0);
        assert!(!result.meets_threshold);
    }
}
