// =============================================================================
// Momentum — percent price change over a fixed lookback window
// =============================================================================

/// `(last − series[last−period]) / series[last−period] × 100`, rounded to
/// two decimals. Returns `None` if there are fewer than `period + 1` closes
/// or the reference price is zero (division would be undefined).
pub fn calculate_momentum(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let last = *closes.last()?;
    let reference = closes[closes.len() - 1 - period];
    if reference == 0.0 {
        return None;
    }

    let momentum = (last - reference) / reference * 100.0;
    Some((momentum * 100.0).round() / 100.0)
}
