//! Forward-mode automatic differentiation via dual numbers.
//!
//! A dual number `Dual { val, dot }` carries a value and its derivative with
//! respect to one seeded variable. A full gradient takes one evaluation per
//! parameter, each seeding a different variable with `dot = 1.0`.

use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A dual number for forward-mode AD.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    /// Primal (function) value.
    pub val: f64,
    /// Tangent (derivative) value.
    pub dot: f64,
}

impl Dual {
    /// Create a constant (derivative = 0).
    #[inline]
    pub fn constant(val: f64) -> Self {
        Self { val, dot: 0.0 }
    }

    /// Create an independent variable (derivative = 1).
    #[inline]
    pub fn var(val: f64) -> Self {
        Self { val, dot: 1.0 }
    }

    /// Create a dual with explicit tangent.
    #[inline]
    pub fn new(val: f64, dot: f64) -> Self {
        Self { val, dot }
    }

    /// Natural logarithm: d/dx ln(x) = 1/x.
    #[inline]
    pub fn ln(self) -> Self {
        Self { val: self.val.ln(), dot: self.dot / self.val }
    }

    /// Exponential: d/dx exp(x) = exp(x).
    #[inline]
    pub fn exp(self) -> Self {
        let e = self.val.exp();
        Self { val: e, dot: self.dot * e }
    }

    /// Integer power: d/dx x^n = n * x^(n-1).
    #[inline]
    pub fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::constant(1.0);
        }
        Self { val: self.val.powi(n), dot: self.dot * (n as f64) * self.val.powi(n - 1) }
    }

    /// Absolute value: d/dx |x| = sign(x).
    #[inline]
    pub fn abs(self) -> Self {
        Self { val: self.val.abs(), dot: self.dot * self.val.signum() }
    }

    /// Maximum of two duals. Derivative follows the larger operand.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        if self.val >= other.val { self } else { other }
    }
}

impl Add for Dual {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self { val: self.val + rhs.val, dot: self.dot + rhs.dot }
    }
}

impl Sub for Dual {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self { val: self.val - rhs.val, dot: self.dot - rhs.dot }
    }
}

impl Mul for Dual {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self { val: self.val * rhs.val, dot: self.dot * rhs.val + self.val * rhs.dot }
    }
}

impl Div for Dual {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        Self {
            val: self.val / rhs.val,
            dot: (self.dot * rhs.val - self.val * rhs.dot) / (rhs.val * rhs.val),
        }
    }
}

impl Neg for Dual {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self { val: -self.val, dot: -self.dot }
    }
}

impl Sum for Dual {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::constant(0.0), |acc, x| acc + x)
    }
}
