//! The number type of the likelihood.
//!
//! Expected yields, interpolation and the Poisson/Gaussian terms are generic
//! over [`Scalar`]. Instantiated with `f64` they give the NLL; instantiated with
//! [`Dual`] they carry one directional derivative alongside, which
//! [`gradient`] turns into the full gradient.

use crate::dual::Dual;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arithmetic needed by histfit's likelihood code.
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Sum
    + PartialOrd
    + Sized
{
    /// A constant (zero derivative).
    fn from_f64(v: f64) -> Self;

    /// Plain value, used for branching on interpolation regions and rate checks.
    fn value(&self) -> f64;

    /// `ln x`
    fn ln(self) -> Self;

    /// `e^x`
    fn exp(self) -> Self;

    /// `x^n`
    fn powi(self, n: i32) -> Self;

    /// `|x|`
    fn abs(self) -> Self;

    /// `self` if its value is at least `floor`, otherwise the constant `floor`.
    ///
    /// Keeps trial rates positive during minimisation; the floored branch has
    /// zero derivative.
    fn floor_at(self, floor: f64) -> Self;
}

macro_rules! forward_math {
    ($t:ty) => {
        #[inline]
        fn ln(self) -> Self {
            <$t>::ln(self)
        }

        #[inline]
        fn exp(self) -> Self {
            <$t>::exp(self)
        }

        #[inline]
        fn powi(self, n: i32) -> Self {
            <$t>::powi(self, n)
        }

        #[inline]
        fn abs(self) -> Self {
            <$t>::abs(self)
        }
    };
}

impl Scalar for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn value(&self) -> f64 {
        *self
    }

    forward_math!(f64);

    #[inline]
    fn floor_at(self, floor: f64) -> Self {
        self.max(floor)
    }
}

impl Scalar for Dual {
    #[inline]
    fn from_f64(v: f64) -> Self {
        Dual::constant(v)
    }

    #[inline]
    fn value(&self) -> f64 {
        self.val
    }

    forward_math!(Dual);

    #[inline]
    fn floor_at(self, floor: f64) -> Self {
        Dual::max(self, Dual::constant(floor))
    }
}

/// Gradient of a scalar function by forward-mode AD, one pass per coordinate.
pub fn gradient<F, E>(x: &[f64], mut f: F) -> Result<Vec<f64>, E>
where
    F: FnMut(&[Dual]) -> Result<Dual, E>,
{
    let mut seeded: Vec<Dual> = x.iter().map(|&v| Dual::constant(v)).collect();
    let mut grad = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        seeded[i].dot = 1.0;
        grad.push(f(&seeded)?.dot);
        seeded[i].dot = 0.0;
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn poisson_nll_bin<S: Scalar>(obs: f64, expected: S) -> S {
        let obs_s = S::from_f64(obs);
        let expected = expected.floor_at(1e-10);
        if obs > 0.0 { expected - obs_s * expected.ln() } else { expected }
    }

    #[test]
    fn test_scalar_f64_poisson() {
        let nll = poisson_nll_bin::<f64>(10.0, 12.0);
        let expected = 12.0 - 10.0 * 12.0_f64.ln();
        assert_relative_eq!(nll, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_scalar_dual_poisson_gradient() {
        // d/dlam [lam - n*ln(lam)] = 1 - n/lam
        let lam = Dual::var(12.0);
        let nll = poisson_nll_bin(10.0, lam);
        assert_relative_eq!(nll.dot, 1.0 - 10.0 / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_floor_drops_derivative() {
        let floored = Dual::var(-3.0).floor_at(1e-10);
        assert_eq!((floored.val, floored.dot), (1e-10, 0.0));
        let kept = Dual::var(2.0).floor_at(1e-10);
        assert_eq!((kept.val, kept.dot), (2.0, 1.0));
        assert_eq!((-3.0f64).floor_at(0.5), 0.5);
    }

    #[test]
    fn test_gradient_helper_matches_analytic() {
        // f(x, y) = x^2 y + exp(y)
        let g = gradient::<_, ()>(&[1.5, 0.3], |p| Ok(p[0] * p[0] * p[1] + p[1].exp())).unwrap();
        assert_relative_eq!(g[0], 2.0 * 1.5 * 0.3, epsilon = 1e-12);
        assert_relative_eq!(g[1], 1.5 * 1.5 + 0.3_f64.exp(), epsilon = 1e-12);
    }
}
