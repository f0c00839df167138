//! Asymptotic CLs hypothesis tests.
//!
//! The test statistic is the profile-likelihood ratio `q_mu` (or the
//! bounded-signal variant `qtilde_mu`). Its sampling distribution is taken from
//! the asymptotic formulae of Cowan, Cranmer, Gross and Vitells, calibrated on the
//! Asimov dataset generated under the background-only hypothesis. All p-values
//! are expressed in `-muhat/sigma` space, where both distributions are unit
//! normals shifted by `-sqrt(q_mu,A)` (signal+background) and `0` (background).

use crate::mle::{MaximumLikelihoodEstimator, fix_parameters};
use hf_core::{Error, Result};
use hf_model::HistFactoryModel;
use hf_prob::normal;
use rayon::prelude::*;

/// Expected-set quantiles in `-muhat/sigma` space.
///
/// The resulting CLs band runs from the most to the least excluding fluctuation,
/// i.e. `-2 sigma` to `+2 sigma` of the expected CLs.
pub const NSIGMA: [f64; 5] = [2.0, 1.0, 0.0, -1.0, -2.0];

const CLB_MIN: f64 = 1e-300;

/// Options of [`hypotest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HypotestOptions {
    /// Use `qtilde_mu` (signal strength bounded below by zero) instead of `q_mu`
    pub qtilde: bool,
    /// Also compute the expected CLs band
    pub return_expected_set: bool,
}

impl Default for HypotestOptions {
    fn default() -> Self {
        Self { qtilde: true, return_expected_set: false }
    }
}

/// Outcome of one asymptotic test at a fixed `mu_test`.
#[derive(Debug, Clone, PartialEq)]
pub struct HypotestResult {
    /// Tested signal strength
    pub mu_test: f64,
    /// Observed CLs
    pub cls: f64,
    /// Observed CLs+b
    pub clsb: f64,
    /// Observed CLb
    pub clb: f64,
    /// Test statistic in `-muhat/sigma` space
    pub teststat: f64,
    /// Observed `q_mu` (or `qtilde_mu`)
    pub q_mu: f64,
    /// Asimov `q_mu,A`
    pub q_mu_a: f64,
    /// Best-fit signal strength on the observed data
    pub mu_hat: f64,
    /// Expected CLs at [`NSIGMA`], when requested
    pub expected: Option<[f64; 5]>,
}

impl HypotestResult {
    /// `(CLs+b, CLb)`
    pub fn tail_probs(&self) -> (f64, f64) {
        (self.clsb, self.clb)
    }
}

/// Observed and expected upper limits on the signal strength.
#[derive(Debug, Clone, PartialEq)]
pub struct UpperLimit {
    /// Observed limit
    pub observed: f64,
    /// Expected limits, ordered like [`NSIGMA`] (-2 sigma first)
    pub expected: [f64; 5],
    /// Scanned signal strengths
    pub scan: Vec<f64>,
    /// Per-point results
    pub results: Vec<HypotestResult>,
}

#[derive(Debug, Clone, Copy)]
struct FreeFit {
    nll: f64,
    mu_hat: f64,
}

/// Caches the fits shared by every `mu_test`: the free fits to the observed and
/// Asimov data and the Asimov dataset itself.
#[derive(Debug, Clone)]
pub struct AsymptoticCalculator<'a> {
    model: &'a HistFactoryModel,
    mle: MaximumLikelihoodEstimator,
    qtilde: bool,
    poi: usize,
    init: Vec<f64>,
    bounds: Vec<(f64, f64)>,
    data: Vec<f64>,
    asimov: Vec<f64>,
    background_nuisances: Vec<f64>,
    free_data: FreeFit,
    free_asimov: FreeFit,
}

impl<'a> AsymptoticCalculator<'a> {
    /// Build a calculator with the default estimator.
    pub fn new(model: &'a HistFactoryModel, data: &[f64], qtilde: bool) -> Result<Self> {
        Self::with_estimator(model, data, qtilde, MaximumLikelihoodEstimator::new())
    }

    /// Build a calculator with a custom estimator. Any failing fit aborts construction.
    pub fn with_estimator(
        model: &'a HistFactoryModel,
        data: &[f64],
        qtilde: bool,
        mle: MaximumLikelihoodEstimator,
    ) -> Result<Self> {
        let poi = model.poi_index();
        let init = model.suggested_init();
        let bounds = model.suggested_bounds();
        if qtilde && bounds[poi].0 < 0.0 {
            log::warn!(
                "qtilde test statistic with POI '{}' allowed below zero ({:?})",
                model.poi_name(),
                bounds[poi]
            );
        }

        let mut calc = Self {
            model,
            mle,
            qtilde,
            poi,
            init,
            bounds,
            data: data.to_vec(),
            asimov: Vec::new(),
            background_nuisances: Vec::new(),
            free_data: FreeFit { nll: 0.0, mu_hat: 0.0 },
            free_asimov: FreeFit { nll: 0.0, mu_hat: 0.0 },
        };

        calc.free_data = calc.free_fit(&calc.data)?;

        // Background-only Asimov data: nuisances profiled on the observed data at mu = 0.
        let nuisances = calc.conditional_fit(&calc.data, 0.0)?.0;
        calc.asimov = model.expected_data(&nuisances, true)?;
        calc.background_nuisances = nuisances;
        calc.free_asimov = calc.free_fit(&calc.asimov)?;

        log::debug!(
            "asymptotic calculator: mu_hat={:.6} (data), {:.6} (Asimov)",
            calc.free_data.mu_hat,
            calc.free_asimov.mu_hat
        );
        Ok(calc)
    }

    /// The Asimov dataset (main bins + auxdata) used for calibration.
    pub fn asimov_data(&self) -> &[f64] {
        &self.asimov
    }

    /// Best-fit signal strength on the observed data.
    pub fn mu_hat(&self) -> f64 {
        self.free_data.mu_hat
    }

    fn free_fit(&self, data: &[f64]) -> Result<FreeFit> {
        let likelihood = self.model.likelihood(data)?;
        let r = self.mle.fit_minimum_from(&likelihood, &self.init, &self.bounds)?;
        let mu_hat = r.parameters[self.poi];
        if !(self.qtilde && mu_hat < 0.0) {
            return Ok(FreeFit { nll: r.fval, mu_hat });
        }

        log::debug!("mu_hat = {:.6} < 0, refitting with mu >= 0", mu_hat);
        let mut bounds = self.bounds.clone();
        bounds[self.poi] = (0.0, bounds[self.poi].1.max(0.0));
        let mut init = r.parameters;
        init[self.poi] = 0.0;
        let r = self.mle.fit_minimum_from(&likelihood, &init, &bounds)?;
        Ok(FreeFit { nll: r.fval, mu_hat: r.parameters[self.poi] })
    }

    fn conditional_fit(&self, data: &[f64], mu: f64) -> Result<(Vec<f64>, f64)> {
        let likelihood = self.model.likelihood(data)?;
        let mut init = self.init.clone();
        let mut bounds = self.bounds.clone();
        fix_parameters(&mut init, &mut bounds, &[(self.poi, mu)])?;
        let r = self.mle.fit_minimum_from(&likelihood, &init, &bounds)?;
        Ok((r.parameters, r.fval))
    }

    fn q_mu(&self, data: &[f64], free: FreeFit, mu: f64) -> Result<f64> {
        if free.mu_hat > mu {
            return Ok(0.0);
        }
        let (_, nll) = self.conditional_fit(data, mu)?;
        Ok((2.0 * (nll - free.nll)).max(0.0))
    }

    /// Whether the expected main yields ignore the POI between 0 and `mu_test`.
    ///
    /// Checked with the nuisances at their initial values and at the
    /// background-only fit to the data. A POI that only acts at nuisance values
    /// reached by neither point goes undetected.
    fn poi_insensitive(&self, mu_test: f64) -> Result<bool> {
        for nuisances in [&self.init, &self.background_nuisances] {
            let mut at_zero = nuisances.clone();
            at_zero[self.poi] = 0.0;
            let mut at_test = nuisances.clone();
            at_test[self.poi] = mu_test;
            let a = self.model.expected_data(&at_zero, false)?;
            let b = self.model.expected_data(&at_test, false)?;
            if !a.iter().zip(&b).all(|(x, y)| (x - y).abs() <= 1e-12 * x.abs().max(y.abs())) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Observed CLs (and optionally the expected band) at `mu_test`.
    pub fn hypotest(&self, mu_test: f64, return_expected_set: bool) -> Result<HypotestResult> {
        if !mu_test.is_finite() {
            return Err(Error::Validation(format!("mu_test must be finite, got {}", mu_test)));
        }

        if self.poi_insensitive(mu_test)? {
            log::warn!(
                "expected yields do not depend on '{}' at mu_test={}; test has no power, CLs = 1",
                self.model.poi_name(),
                mu_test
            );
            return Ok(HypotestResult {
                mu_test,
                cls: 1.0,
                clsb: 0.5,
                clb: 0.5,
                teststat: 0.0,
                q_mu: 0.0,
                q_mu_a: 0.0,
                mu_hat: self.free_data.mu_hat,
                expected: return_expected_set.then_some([1.0; 5]),
            });
        }

        let q_mu = self.q_mu(&self.data, self.free_data, mu_test)?;
        let q_mu_a = self.q_mu(&self.asimov, self.free_asimov, mu_test)?;
        let sqrtq = q_mu.sqrt();
        let sqrtq_a = q_mu_a.sqrt();

        let teststat = if !self.qtilde || sqrtq <= sqrtq_a {
            sqrtq - sqrtq_a
        } else {
            (q_mu - q_mu_a) / (2.0 * sqrtq_a.max(1e-16))
        };

        let (cls, clsb, clb) = cls_at(teststat, sqrtq_a)?;
        let expected = if return_expected_set {
            let mut band = [0.0; 5];
            for (b, &n) in band.iter_mut().zip(NSIGMA.iter()) {
                *b = cls_at(n, sqrtq_a)?.0;
            }
            Some(band)
        } else {
            None
        };

        log::debug!(
            "hypotest mu={}: q={:.6} qA={:.6} CLs={:.6}",
            mu_test,
            q_mu,
            q_mu_a,
            cls
        );
        Ok(HypotestResult {
            mu_test,
            cls,
            clsb,
            clb,
            teststat,
            q_mu,
            q_mu_a,
            mu_hat: self.free_data.mu_hat,
            expected,
        })
    }
}

/// `(CLs, CLs+b, CLb)` for a test statistic `t` in `-muhat/sigma` space.
fn cls_at(t: f64, sqrtq_a: f64) -> Result<(f64, f64, f64)> {
    let clsb = normal::cdf(-(t + sqrtq_a));
    let clb = normal::cdf(-t);
    if !(clsb.is_finite() && clb.is_finite()) {
        return Err(Error::NumericDomain(format!(
            "non-finite tail probabilities: CLs+b={}, CLb={}",
            clsb, clb
        )));
    }
    // Both tails underflow far from the bulk; the ratio tends to 0 there.
    if clb <= CLB_MIN {
        return Ok((if clsb <= CLB_MIN { 0.0 } else { 1.0 }, clsb, clb));
    }
    // CLs+b <= CLb holds exactly since sqrt(q_mu,A) >= 0; only rounding may break it.
    let cls = clsb / clb;
    if cls > 1.0 + 1e-12 {
        return Err(Error::NumericDomain(format!(
            "CLs = {} exceeds 1 (CLs+b={}, CLb={})",
            cls, clsb, clb
        )));
    }
    Ok((cls.min(1.0), clsb, clb))
}

/// Asymptotic CLs at `mu_test` for `data` (main bins followed by auxdata).
///
/// Fit failures abort the test with the fit's error.
pub fn hypotest(
    mu_test: f64,
    data: &[f64],
    model: &HistFactoryModel,
    options: HypotestOptions,
) -> Result<HypotestResult> {
    AsymptoticCalculator::new(model, data, options.qtilde)?
        .hypotest(mu_test, options.return_expected_set)
}

/// [`hypotest`] over many `mu_test` values, evaluated in parallel.
///
/// The free fits are shared; every point runs its own conditional fits.
pub fn hypotest_scan(
    mu_values: &[f64],
    data: &[f64],
    model: &HistFactoryModel,
    options: HypotestOptions,
) -> Result<Vec<HypotestResult>> {
    let calc = AsymptoticCalculator::new(model, data, options.qtilde)?;
    mu_values.par_iter().map(|&mu| calc.hypotest(mu, options.return_expected_set)).collect()
}

/// Observed and expected CLs upper limits at level `alpha` from a linear scan.
pub fn upper_limit(
    data: &[f64],
    model: &HistFactoryModel,
    scan: &[f64],
    alpha: f64,
) -> Result<UpperLimit> {
    if scan.len() < 2 || scan.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Validation(
            "scan must hold at least 2 strictly increasing values".to_string(),
        ));
    }
    if !(0.0 < alpha && alpha < 1.0) {
        return Err(Error::Validation(format!("alpha must be in (0, 1), got {}", alpha)));
    }

    let options = HypotestOptions { return_expected_set: true, ..HypotestOptions::default() };
    let results = hypotest_scan(scan, data, model, options)?;

    let observed_cls: Vec<f64> = results.iter().map(|r| r.cls).collect();
    let observed = interp_limit(alpha, scan, &observed_cls)?;
    let mut expected = [0.0; 5];
    for (j, e) in expected.iter_mut().enumerate() {
        let band: Vec<f64> =
            results.iter().map(|r| r.expected.map_or(f64::NAN, |b| b[j])).collect();
        *e = interp_limit(alpha, scan, &band)?;
    }
    log::debug!("upper limit at CLs={}: observed {:.4}, expected {:?}", alpha, observed, expected);

    Ok(UpperLimit { observed, expected, scan: scan.to_vec(), results })
}

/// Where a (mostly decreasing) CLs curve crosses `alpha`, by linear interpolation.
///
/// Outside the scanned range the nearest end is returned; with noisy,
/// non-monotone curves the first downward crossing wins.
fn interp_limit(alpha: f64, xs: &[f64], ys: &[f64]) -> Result<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return Err(Error::Validation("interpolation needs >= 2 matching points".to_string()));
    }
    if ys.iter().any(|y| !y.is_finite()) {
        return Err(Error::NumericDomain("non-finite CLs in limit scan".to_string()));
    }
    for i in 0..xs.len() - 1 {
        let (y0, y1) = (ys[i], ys[i + 1]);
        if y0 >= alpha && y1 <= alpha {
            if y0 == y1 {
                return Ok(xs[i]);
            }
            return Ok(xs[i] + (alpha - y0) / (y1 - y0) * (xs[i + 1] - xs[i]));
        }
    }
    if ys.iter().all(|&y| y > alpha) {
        log::warn!("CLs stays above {} over the scan; limit is at the scan edge", alpha);
        return Ok(xs[xs.len() - 1]);
    }
    Ok(xs[0])
}
