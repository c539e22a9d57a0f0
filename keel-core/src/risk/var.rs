//! Historical-simulation Value at Risk
//!
//! VaR at confidence α is the loss at the empirical (1−α) quantile of the
//! return distribution; CVaR is the mean loss in the tail at or beyond that
//! quantile. Both are reported as non-negative loss fractions.

/// Compute (VaR, CVaR) at confidence `confidence` over simple returns.
///
/// The quantile index is `ceil((1 − α) · n)` on the ascending-sorted
/// returns, 1-based, clamped to `[1, n]`. Returns `None` when the series is
/// empty or the confidence is outside (0, 1).
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<(f64, f64)> {
    if returns.is_empty() || !(0.0..1.0).contains(&confidence) || confidence <= 0.0 {
        return None;
    }
    let mut sorted: Vec<f64> = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    // Nudge below the exact product so float noise cannot push the ceiling
    // up one rank.
    let raw = (1.0 - confidence) * n as f64 - 1e-9;
    let idx = (raw.ceil() as usize).clamp(1, n);

    let var = (-sorted[idx - 1]).max(0.0);
    let tail_mean = sorted[..idx].iter().sum::<f64>() / idx as f64;
    let cvar = (-tail_mean).max(0.0);
    Some((var, cvar))
}
