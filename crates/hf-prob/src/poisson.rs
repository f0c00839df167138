//! Poisson log-probability, continuous in the observed count.
//!
//! Bin counts and auxiliary observations (e.g. `tau` for a Poisson-constrained
//! shape uncertainty) need not be integers, so the normalisation uses
//! `lnΓ(n + 1)` instead of a factorial.

use hf_ad::Scalar;
use hf_core::{Error, Result};
use statrs::function::gamma::ln_gamma;

/// `ln Γ(n + 1)`, the count-only normalisation term.
#[inline]
pub fn ln_factorial(n: f64) -> f64 {
    ln_gamma(n + 1.0)
}

/// Negative log-probability of observing `n` given rate `lam`, without domain checks.
///
/// `-log p(n | lam) = lam - n ln(lam) + lnΓ(n + 1)`. For `n == 0` the log term is
/// dropped so that `lam == 0` yields `0`.
#[inline]
pub fn nll_unchecked<S: Scalar>(n: f64, lam: S) -> S {
    if n > 0.0 {
        lam - S::from_f64(n) * lam.ln() + S::from_f64(ln_factorial(n))
    } else {
        lam
    }
}

/// Negative log-probability with the rate checked against the Poisson domain.
///
/// Fails with [`Error::NumericDomain`] for negative or non-finite rates, and for a
/// zero rate with a positive observation.
pub fn nll<S: Scalar>(n: f64, lam: S) -> Result<S> {
    let v = lam.value();
    if !v.is_finite() || v < 0.0 {
        return Err(Error::NumericDomain(format!("Poisson rate must be finite and >= 0, got {}", v)));
    }
    if v == 0.0 && n > 0.0 {
        return Err(Error::NumericDomain(format!("Poisson rate is 0 but observed count is {}", n)));
    }
    Ok(nll_unchecked(n, lam))
}

/// Log-PMF (continuous in `n`).
pub fn logpmf(n: f64, lam: f64) -> Result<f64> {
    if !n.is_finite() || n < 0.0 {
        return Err(Error::Validation(format!("Poisson count must be finite and >= 0, got {}", n)));
    }
    Ok(-nll(n, lam)?)
}
