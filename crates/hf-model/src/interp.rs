//! Interpolation of systematic variations.
//!
//! A nuisance parameter `alpha` morphs a yield between its `down` (alpha = -1),
//! nominal (alpha = 0) and `up` (alpha = +1) templates. Codes follow the pyhf
//! naming:
//!
//! | code    | kind           | inside [-1, 1]        | outside            |
//! |---------|----------------|-----------------------|--------------------|
//! | `code0` | additive       | piecewise linear      | linear             |
//! | `code1` | multiplicative | piecewise exponential | exponential        |
//! | `code2` | additive       | quadratic             | linear             |
//! | `code4` | multiplicative | degree-6 polynomial   | exponential        |
//! | `code4p`| additive       | degree-6 polynomial   | linear             |
//!
//! Every code returns the nominal value exactly at `alpha = 0`.

use hf_ad::Scalar;
use hf_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interpolation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpCode {
    /// Piecewise-linear, additive.
    #[serde(rename = "code0")]
    Code0,
    /// Piecewise-exponential, multiplicative.
    #[serde(rename = "code1")]
    Code1,
    /// Quadratic with linear extrapolation, additive.
    #[serde(rename = "code2")]
    Code2,
    /// Polynomial with exponential extrapolation, multiplicative.
    #[serde(rename = "code4")]
    Code4,
    /// Polynomial with linear extrapolation, additive.
    #[serde(rename = "code4p")]
    Code4p,
}

impl InterpCode {
    /// Multiplicative codes produce a factor on the nominal; additive ones a delta.
    pub fn is_multiplicative(self) -> bool {
        matches!(self, InterpCode::Code1 | InterpCode::Code4)
    }

    /// pyhf name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            InterpCode::Code0 => "code0",
            InterpCode::Code1 => "code1",
            InterpCode::Code2 => "code2",
            InterpCode::Code4 => "code4",
            InterpCode::Code4p => "code4p",
        }
    }
}

impl fmt::Display for InterpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "code0" => Ok(InterpCode::Code0),
            "code1" => Ok(InterpCode::Code1),
            "code2" => Ok(InterpCode::Code2),
            "code4" => Ok(InterpCode::Code4),
            "code4p" => Ok(InterpCode::Code4p),
            other => Err(Error::Configuration(format!("unknown interpolation code '{}'", other))),
        }
    }
}

/// Interpolation choice for one modifier type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpSetting {
    /// Interpolation code.
    pub interpcode: InterpCode,
}

/// Interpolation codes used for a whole model build.
///
/// Deserializes from the pyhf layout
/// `{"normsys": {"interpcode": "code4"}, "histosys": {"interpcode": "code4p"}}`;
/// missing entries keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierSettings {
    /// Code for `normsys` modifiers (default `code1`).
    pub normsys: InterpSetting,
    /// Code for `histosys` modifiers (default `code0`).
    pub histosys: InterpSetting,
}

impl Default for ModifierSettings {
    fn default() -> Self {
        Self {
            normsys: InterpSetting { interpcode: InterpCode::Code1 },
            histosys: InterpSetting { interpcode: InterpCode::Code0 },
        }
    }
}

impl ModifierSettings {
    /// Settings with explicit codes.
    pub fn new(normsys: InterpCode, histosys: InterpCode) -> Self {
        Self {
            normsys: InterpSetting { interpcode: normsys },
            histosys: InterpSetting { interpcode: histosys },
        }
    }

    /// Parse from a JSON value; malformed settings are a configuration error.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Configuration(format!("invalid modifier settings: {}", e)))
    }
}

/// Interpolated effect of `alpha` on a single value.
///
/// Returns a multiplicative factor for multiplicative codes and an additive delta
/// for additive codes (see [`InterpCode::is_multiplicative`]).
pub fn interpolate<T: Scalar>(code: InterpCode, alpha: T, nominal: f64, down: f64, up: f64) -> T {
    match code {
        InterpCode::Code0 => code0(alpha, nominal, down, up),
        InterpCode::Code1 => {
            if nominal == 0.0 {
                return T::from_f64(1.0);
            }
            code1(alpha, down / nominal, up / nominal)
        }
        InterpCode::Code2 => code2(alpha, nominal, down, up),
        InterpCode::Code4 => {
            if nominal == 0.0 {
                return T::from_f64(1.0);
            }
            code4(alpha, down / nominal, up / nominal)
        }
        InterpCode::Code4p => code4p(alpha, nominal, down, up),
    }
}

/// Interpolated value itself: `nominal * factor` or `nominal + delta`.
pub fn interpolated_value<T: Scalar>(
    code: InterpCode,
    alpha: T,
    nominal: f64,
    down: f64,
    up: f64,
) -> T {
    let effect = interpolate(code, alpha, nominal, down, up);
    if code.is_multiplicative() {
        T::from_f64(nominal) * effect
    } else {
        T::from_f64(nominal) + effect
    }
}

/// Normalisation factor of a `normsys` modifier with relative variations `lo`, `hi`.
///
/// Additive codes are applied around a nominal of 1 and return `1 + delta`.
pub fn normsys_factor<T: Scalar>(code: InterpCode, alpha: T, lo: f64, hi: f64) -> T {
    let effect = interpolate(code, alpha, 1.0, lo, hi);
    if code.is_multiplicative() { effect } else { T::from_f64(1.0) + effect }
}

/// Additive delta of a `histosys` modifier on one bin.
///
/// Multiplicative codes are converted with `nominal * (factor - 1)`, which
/// vanishes on empty bins.
pub fn histosys_delta<T: Scalar>(code: InterpCode, alpha: T, nominal: f64, lo: f64, hi: f64) -> T {
    let effect = interpolate(code, alpha, nominal, lo, hi);
    if code.is_multiplicative() {
        if nominal == 0.0 {
            return T::from_f64(0.0);
        }
        T::from_f64(nominal) * (effect - T::from_f64(1.0))
    } else {
        effect
    }
}

fn code0<T: Scalar>(alpha: T, nominal: f64, down: f64, up: f64) -> T {
    if alpha.value() >= 0.0 {
        alpha * T::from_f64(up - nominal)
    } else {
        alpha * T::from_f64(nominal - down)
    }
}

/// Linear factor used when a ratio is not positive and no logarithm exists.
fn linear_factor<T: Scalar>(alpha: T, lo: f64, hi: f64) -> T {
    if alpha.value() >= 0.0 {
        T::from_f64(1.0) + alpha * T::from_f64(hi - 1.0)
    } else {
        T::from_f64(1.0) + alpha * T::from_f64(1.0 - lo)
    }
}

fn code1<T: Scalar>(alpha: T, lo: f64, hi: f64) -> T {
    if lo <= 0.0 || hi <= 0.0 {
        return linear_factor(alpha, lo, hi);
    }
    if alpha.value() >= 0.0 {
        (alpha * T::from_f64(hi.ln())).exp()
    } else {
        (-alpha * T::from_f64(lo.ln())).exp()
    }
}

fn code2<T: Scalar>(alpha: T, nominal: f64, down: f64, up: f64) -> T {
    let a = 0.5 * (up + down) - nominal;
    let b = 0.5 * (up - down);
    let v = alpha.value();
    if v > 1.0 {
        T::from_f64(b + 2.0 * a) * (alpha - T::from_f64(1.0)) + T::from_f64(up - nominal)
    } else if v < -1.0 {
        T::from_f64(b - 2.0 * a) * (alpha + T::from_f64(1.0)) + T::from_f64(down - nominal)
    } else {
        T::from_f64(a) * alpha * alpha + T::from_f64(b) * alpha
    }
}

/// Polynomial coefficients of `code4` (with `alpha0 = 1`) for relative factors.
fn code4_coeffs(lo: f64, hi: f64) -> [f64; 6] {
    const A_INV: [[f64; 6]; 6] = [
        [15.0 / 16.0, -15.0 / 16.0, -7.0 / 16.0, -7.0 / 16.0, 1.0 / 16.0, -1.0 / 16.0],
        [3.0 / 2.0, 3.0 / 2.0, -9.0 / 16.0, 9.0 / 16.0, 1.0 / 16.0, 1.0 / 16.0],
        [-5.0 / 8.0, 5.0 / 8.0, 5.0 / 8.0, 5.0 / 8.0, -1.0 / 8.0, 1.0 / 8.0],
        [-3.0 / 2.0, -3.0 / 2.0, 7.0 / 8.0, -7.0 / 8.0, -1.0 / 8.0, -1.0 / 8.0],
        [3.0 / 16.0, -3.0 / 16.0, -3.0 / 16.0, -3.0 / 16.0, 1.0 / 16.0, -1.0 / 16.0],
        [1.0 / 2.0, 1.0 / 2.0, -5.0 / 16.0, 5.0 / 16.0, 1.0 / 16.0, 1.0 / 16.0],
    ];

    // Value, first and second derivative of hi^a and lo^-a at the boundaries.
    let (ln_hi, ln_lo) = (hi.ln(), lo.ln());
    let b = [
        hi - 1.0,
        lo - 1.0,
        hi * ln_hi,
        -lo * ln_lo,
        hi * ln_hi * ln_hi,
        lo * ln_lo * ln_lo,
    ];

    let mut a = [0.0; 6];
    for (row, out) in A_INV.iter().zip(a.iter_mut()) {
        *out = row.iter().zip(b.iter()).map(|(m, v)| m * v).sum();
    }
    a
}

fn code4<T: Scalar>(alpha: T, lo: f64, hi: f64) -> T {
    if lo <= 0.0 || hi <= 0.0 {
        return linear_factor(alpha, lo, hi);
    }

    let v = alpha.value();
    if v.abs() >= 1.0 {
        let base = if v >= 0.0 { hi } else { lo };
        return (alpha.abs() * T::from_f64(base.ln())).exp();
    }

    let c = code4_coeffs(lo, hi);
    let mut acc = T::from_f64(0.0);
    for &ci in c.iter().rev() {
        acc = (acc + T::from_f64(ci)) * alpha;
    }
    T::from_f64(1.0) + acc
}

fn code4p<T: Scalar>(alpha: T, nominal: f64, down: f64, up: f64) -> T {
    let delta_up = up - nominal;
    let delta_dn = nominal - down;

    let v = alpha.value();
    if v > 1.0 {
        return alpha * T::from_f64(delta_up);
    }
    if v < -1.0 {
        return alpha * T::from_f64(delta_dn);
    }

    let s = T::from_f64(0.5 * (delta_up + delta_dn));
    let a = T::from_f64(0.0625 * (delta_up - delta_dn));
    let asq = alpha * alpha;
    let poly = asq * (asq * (asq * T::from_f64(3.0) - T::from_f64(10.0)) + T::from_f64(15.0));
    alpha * s + poly * a
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hf_ad::Dual;
    use proptest::prelude::*;

    const ALL: [InterpCode; 5] =
        [InterpCode::Code0, InterpCode::Code1, InterpCode::Code2, InterpCode::Code4, InterpCode::Code4p];

    #[test]
    fn test_templates_reproduced_at_plus_minus_one() {
        for code in ALL {
            let up = interpolated_value(code, 1.0, 10.0, 8.0, 13.0);
            let down = interpolated_value(code, -1.0, 10.0, 8.0, 13.0);
            assert_relative_eq!(up, 13.0, epsilon = 1e-10);
            assert_relative_eq!(down, 8.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_code0_extrapolates_linearly() {
        assert_relative_eq!(interpolate(InterpCode::Code0, 2.0, 10.0, 8.0, 13.0), 6.0);
        assert_relative_eq!(interpolate(InterpCode::Code0, -0.5, 10.0, 8.0, 13.0), -1.0);
    }

    #[test]
    fn test_code1_is_exponential() {
        let f = interpolate(InterpCode::Code1, 0.5, 1.0, 0.9, 1.2);
        assert_relative_eq!(f, 1.2_f64.powf(0.5), epsilon = 1e-14);
        let f = interpolate(InterpCode::Code1, -2.0, 1.0, 0.9, 1.2);
        assert_relative_eq!(f, 0.9_f64.powi(2), epsilon = 1e-14);
    }

    #[test]
    fn test_code2_quadratic_inside() {
        // a = 0.5, b = 2.5
        let d = interpolate(InterpCode::Code2, 0.5, 10.0, 8.0, 13.0);
        assert_relative_eq!(d, 0.5 * 0.25 + 2.5 * 0.5, epsilon = 1e-14);
        // (b + 2a)(alpha - 1) + up - nom
        let d = interpolate(InterpCode::Code2, 2.0, 10.0, 8.0, 13.0);
        assert_relative_eq!(d, 3.5 + 3.0, epsilon = 1e-14);
    }

    #[test]
    fn test_code4_outside_is_power() {
        let f = interpolate(InterpCode::Code4, 2.5, 1.0, 0.9, 1.2);
        assert_relative_eq!(f, 1.2_f64.powf(2.5), epsilon = 1e-12);
        let f = interpolate(InterpCode::Code4, -1.5, 1.0, 0.9, 1.2);
        assert_relative_eq!(f, 0.9_f64.powf(1.5), epsilon = 1e-12);
    }

    #[test]
    fn test_code4_is_c1_at_boundary() {
        for a0 in [1.0, -1.0] {
            let inside = interpolate(InterpCode::Code4, Dual::var(a0 * (1.0 - 1e-9)), 1.0, 0.85, 1.3);
            let outside = interpolate(InterpCode::Code4, Dual::var(a0), 1.0, 0.85, 1.3);
            assert_relative_eq!(inside.val, outside.val, epsilon = 1e-7);
            assert_relative_eq!(inside.dot, outside.dot, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_normsys_additive_code_is_one_plus_delta() {
        let f = normsys_factor(InterpCode::Code0, 0.5, 0.9, 1.2);
        assert_relative_eq!(f, 1.1, epsilon = 1e-14);
    }

    #[test]
    fn test_histosys_multiplicative_code_on_empty_bin() {
        assert_eq!(histosys_delta(InterpCode::Code1, 1.3, 0.0, 0.0, 2.0), 0.0);
        let d = histosys_delta(InterpCode::Code1, 1.0, 10.0, 8.0, 13.0);
        assert_relative_eq!(d, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_positive_ratio_falls_back_to_linear() {
        let f = interpolate(InterpCode::Code1, -0.5, 1.0, 0.0, 1.2);
        assert_relative_eq!(f, 0.5, epsilon = 1e-14);
        let f = interpolate(InterpCode::Code4, 0.5, 1.0, 0.9, -0.1);
        assert_relative_eq!(f, 1.0 + 0.5 * (-1.1), epsilon = 1e-14);
    }

    #[test]
    fn test_gradient_at_zero_is_symmetric_mean_for_code4p() {
        // d/dalpha at 0 is S = 0.5 * (delta_up + delta_dn)
        let d = interpolate(InterpCode::Code4p, Dual::var(0.0), 10.0, 8.0, 13.0);
        assert_eq!(d.val, 0.0);
        assert_relative_eq!(d.dot, 2.5, epsilon = 1e-14);
    }

    #[test]
    fn test_settings_defaults_and_parsing() {
        let s = ModifierSettings::default();
        assert_eq!(s.normsys.interpcode, InterpCode::Code1);
        assert_eq!(s.histosys.interpcode, InterpCode::Code0);

        let s = ModifierSettings::from_value(serde_json::json!({
            "normsys": {"interpcode": "code4"},
            "histosys": {"interpcode": "code4p"}
        }))
        .unwrap();
        assert_eq!(s, ModifierSettings::new(InterpCode::Code4, InterpCode::Code4p));

        let partial =
            ModifierSettings::from_value(serde_json::json!({"histosys": {"interpcode": "code2"}}))
                .unwrap();
        assert_eq!(partial.normsys.interpcode, InterpCode::Code1);
        assert_eq!(partial.histosys.interpcode, InterpCode::Code2);

        let bad = ModifierSettings::from_value(serde_json::json!({"normsys": {"interpcode": "code3"}}));
        assert!(matches!(bad, Err(Error::Configuration(_))));
        assert!("code9".parse::<InterpCode>().is_err());
        assert_eq!("code4p".parse::<InterpCode>().unwrap(), InterpCode::Code4p);
    }

    proptest! {
        #[test]
        fn prop_alpha_zero_is_exact_nominal(
            nominal in 0.0f64..1e4,
            down_rel in 0.01f64..2.0,
            up_rel in 0.01f64..2.0,
        ) {
            let (down, up) = (nominal * down_rel, nominal * up_rel);
            for code in ALL {
                prop_assert_eq!(interpolated_value(code, 0.0, nominal, down, up), nominal);
                prop_assert_eq!(histosys_delta(code, 0.0, nominal, down, up), 0.0);
                prop_assert_eq!(normsys_factor(code, 0.0, down_rel, up_rel), 1.0);
            }
        }

        #[test]
        fn prop_continuous_at_unit_boundaries(
            down_rel in 0.5f64..0.99,
            up_rel in 1.01f64..1.5,
        ) {
            for code in ALL {
                for a0 in [1.0, -1.0] {
                    let inner = normsys_factor(code, a0 * (1.0 - 1e-10), down_rel, up_rel);
                    let outer = normsys_factor(code, a0 * (1.0 + 1e-10), down_rel, up_rel);
                    prop_assert!((inner - outer).abs() < 1e-8);
                }
            }
        }
    }
}
