//! Normal distribution utilities.

use hf_ad::Scalar;
use hf_core::{Error, Result};
use statrs::function::erf::erfc;

/// Natural log of `sqrt(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Negative log-PDF of `N(mu, sigma)` at `x`, generic in `mu`.
///
/// `-log p(x) = 0.5 * ((x-mu)/sigma)^2 + ln(sigma) + ln(sqrt(2π))`
pub fn nll<S: Scalar>(x: f64, mu: S, sigma: f64) -> Result<S> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    let z = (S::from_f64(x) - mu) / S::from_f64(sigma);
    Ok(S::from_f64(0.5) * z * z + S::from_f64(sigma.ln() + LN_SQRT_2PI))
}

/// Log-PDF of `N(mu, sigma)` at `x`.
pub fn logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    Ok(-nll(x, mu, sigma)?)
}

/// Standard normal CDF `Φ(x)`.
///
/// Uses `erfc` so that the far left tail keeps its relative precision:
/// `Φ(x) = 0.5 * erfc(-x / sqrt(2))`.
pub fn cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal survival function `1 - Φ(x)`.
pub fn sf(x: f64) -> f64 {
    cdf(-x)
}
