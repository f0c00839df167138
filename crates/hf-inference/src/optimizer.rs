//! Bounded quasi-Newton minimisation.
//!
//! A layer over argmin's L-BFGS with a More-Thuente line search. Box
//! constraints are imposed by clamping trial points and projecting the gradient
//! at active bounds, so the solver itself never sees them. Convergence is
//! judged on the projected gradient, not on argmin's termination status.

use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use hf_core::{Error, Result};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Optimizer configuration
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance on the projected gradient norm
    pub tol: f64,
    /// Number of correction pairs kept by L-BFGS
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Raw optimizer outcome
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best parameters found (inside the bounds)
    pub parameters: Vec<f64>,
    /// Objective value at `parameters`
    pub fval: f64,
    /// Iterations
    pub n_iter: u64,
    /// Objective evaluations
    pub n_fev: usize,
    /// Gradient evaluations
    pub n_gev: usize,
    /// Whether the solver met its tolerance
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Function to be minimised.
pub trait ObjectiveFunction: Send + Sync {
    /// Value at `params`
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params`. Defaults to central differences.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; params.len()];
        let mut work = params.to_vec();
        for i in 0..params.len() {
            let eps = 1e-8 * params[i].abs().max(1.0);
            work[i] = params[i] + eps;
            let f_plus = self.eval(&work)?;
            work[i] = params[i] - eps;
            let f_minus = self.eval(&work)?;
            work[i] = params[i];
            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }
        Ok(grad)
    }
}

/// Clamp `params` into `bounds` componentwise.
pub fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

/// Zero gradient components that point out of the box at active bounds.
///
/// A component whose bounds coincide (a fixed parameter) is always zeroed.
pub fn project_gradient(params: &[f64], grad: &mut [f64], bounds: &[(f64, f64)]) {
    const EPS: f64 = 1e-12;
    for ((&x, g), &(lo, hi)) in params.iter().zip(grad.iter_mut()).zip(bounds.iter()) {
        if x <= lo + EPS && *g > 0.0 {
            *g = 0.0;
        }
        if x >= hi - EPS && *g < 0.0 {
            *g = 0.0;
        }
    }
}

/// Evaluation counters and the lowest objective value seen, shared by every
/// L-BFGS run of one minimisation.
#[derive(Default)]
struct Tracker {
    cost: AtomicUsize,
    grad: AtomicUsize,
    best: Mutex<Option<(f64, Vec<f64>)>>,
}

impl Tracker {
    fn eval(&self, objective: &dyn ObjectiveFunction, params: &[f64]) -> Result<f64> {
        self.cost.fetch_add(1, Ordering::Relaxed);
        let f = objective.eval(params)?;
        self.record(params, f);
        Ok(f)
    }

    fn gradient(&self, objective: &dyn ObjectiveFunction, params: &[f64]) -> Result<Vec<f64>> {
        self.grad.fetch_add(1, Ordering::Relaxed);
        objective.gradient(params)
    }

    fn record(&self, params: &[f64], f: f64) {
        if !f.is_finite() {
            return;
        }
        if let Ok(mut best) = self.best.lock() {
            let improves = match best.as_ref() {
                Some((fb, _)) => f < *fb,
                None => true,
            };
            if improves {
                *best = Some((f, params.to_vec()));
            }
        }
    }

    fn best(&self) -> Option<(f64, Vec<f64>)> {
        self.best.lock().ok().and_then(|b| b.clone())
    }
}

struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    tracker: Arc<Tracker>,
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        self.tracker.eval(self.objective, &clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .tracker
            .gradient(self.objective, &clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        project_gradient(&clamped, &mut g, self.bounds);
        Ok(g)
    }
}

/// Outcome of one L-BFGS run between restarts.
struct Leg {
    n_iter: u64,
    message: String,
}

/// L-BFGS with box constraints
///
/// argmin's L-BFGS knows nothing about the box, so near an active bound its
/// direction can stop being a descent direction and the line search gives up.
/// Each such stop is followed by a projected steepest-descent step from the
/// best point seen and a fresh L-BFGS run with an empty history. Every run and
/// every fallback step counts against `max_iter`.
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create an optimizer
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimise `objective` from `init_params` inside `bounds`.
    ///
    /// `converged` is set once the projected gradient is below `tol` in every
    /// component. Running out of iterations, or a point where no projected step
    /// lowers the objective, ends the search with `converged == false`. Errors
    /// from the objective itself are propagated.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "parameter and bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }

        let tracker = Arc::new(Tracker::default());
        let mut x = clamp_params(init_params, bounds);
        let mut fx = tracker.eval(objective, &x)?;
        let mut n_iter = 0u64;
        let mut restarts = 0usize;
        let mut converged = false;
        let mut message;

        loop {
            let remaining = self.config.max_iter.saturating_sub(n_iter);
            if remaining == 0 {
                message = format!("iteration budget of {} exhausted", self.config.max_iter);
                break;
            }

            // Only the first run may stop on a small change in cost.
            let leg = self.lbfgs_leg(objective, bounds, &tracker, x.clone(), remaining, restarts == 0)?;
            n_iter += leg.n_iter.max(1);
            message = leg.message;
            if let Some((fb, xb)) = tracker.best()
                && fb <= fx
            {
                fx = fb;
                x = xb;
            }

            let mut g = tracker.gradient(objective, &x)?;
            project_gradient(&x, &mut g, bounds);
            let gmax = g.iter().fold(0.0_f64, |a, &b| a.max(b.abs()));
            if gmax <= self.config.tol {
                converged = true;
                break;
            }
            if n_iter >= self.config.max_iter {
                message = format!("iteration budget of {} exhausted", self.config.max_iter);
                break;
            }

            match projected_descent_step(objective, &tracker, &x, fx, &g, bounds)? {
                Some((x_next, f_next)) => {
                    x = x_next;
                    fx = f_next;
                }
                None => {
                    message = format!("{message}; no descent along the projected gradient ({gmax:.3e})");
                    break;
                }
            }
            n_iter += 1;
            restarts += 1;
            log::debug!("minimize: restart {} at f={:.10} (|g|={:.3e}) after '{}'", restarts, fx, gmax, message);
        }

        let result = OptimizationResult {
            parameters: x,
            fval: fx,
            n_iter,
            n_fev: tracker.cost.load(Ordering::Relaxed),
            n_gev: tracker.grad.load(Ordering::Relaxed),
            converged,
            message,
        };
        log::debug!("minimize: {} after {} restart(s) ({})", result, restarts, result.message);
        Ok(result)
    }

    /// One L-BFGS run from `start`. A line-search failure ends the run without
    /// an error; the tracker still holds the best point it reached.
    fn lbfgs_leg(
        &self,
        objective: &dyn ObjectiveFunction,
        bounds: &[(f64, f64)],
        tracker: &Arc<Tracker>,
        start: Vec<f64>,
        max_iters: u64,
        with_cost_tolerance: bool,
    ) -> Result<Leg> {
        // argmin's default cost tolerance is ~EPS, far stricter than an NLL needs.
        let tol_cost = if self.config.tol == 0.0 || !with_cost_tolerance {
            0.0
        } else {
            (0.1 * self.config.tol).max(1e-12)
        };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::Validation(format!("invalid optimizer tolerance: {e}")))?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| Error::Validation(format!("invalid optimizer cost tolerance: {e}")))?;

        let problem = ArgminProblem { objective, bounds, tracker: tracker.clone() };
        let grads_before = tracker.grad.load(Ordering::Relaxed);
        match Executor::new(problem, solver).configure(|state| state.param(start).max_iters(max_iters)).run() {
            Ok(res) => {
                let state = res.state();
                Ok(Leg { n_iter: state.get_iter(), message: state.get_termination_status().to_string() })
            }
            Err(e) => {
                // The failed run's iteration count is lost; charge its gradient evaluations.
                let used = tracker.grad.load(Ordering::Relaxed).saturating_sub(grads_before);
                Ok(Leg { n_iter: used as u64, message: e.to_string() })
            }
        }
    }
}

/// Armijo backtracking along the projected path `clamp(x - t g)`.
///
/// `g` must already be projected. Returns `None` when no step length lowers the
/// objective enough.
fn projected_descent_step(
    objective: &dyn ObjectiveFunction,
    tracker: &Tracker,
    x: &[f64],
    fx: f64,
    g: &[f64],
    bounds: &[(f64, f64)],
) -> Result<Option<(Vec<f64>, f64)>> {
    const ARMIJO: f64 = 1e-4;
    let gmax = g.iter().fold(0.0_f64, |a, &b| a.max(b.abs()));
    if gmax == 0.0 {
        return Ok(None);
    }

    // The first trial moves the steepest coordinate by one unit.
    let mut t = 1.0 / gmax;
    for _ in 0..60 {
        let trial: Vec<f64> = x
            .iter()
            .zip(g)
            .zip(bounds)
            .map(|((&xi, &gi), &(lo, hi))| (xi - t * gi).clamp(lo, hi))
            .collect();
        let decrease: f64 = x.iter().zip(&trial).zip(g).map(|((a, b), gi)| gi * (a - b)).sum();
        if decrease <= 0.0 {
            break;
        }
        let f_trial = tracker.eval(objective, &trial)?;
        if f_trial <= fx - ARMIJO * decrease {
            return Ok(Some((trial, f_trial)));
        }
        t *= 0.5;
    }
    Ok(None)
}

impl Default for LbfgsbOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
