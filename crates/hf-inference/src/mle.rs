//! Maximum Likelihood Estimation

use crate::optimizer::{
    LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig, project_gradient,
};
use hf_core::traits::LogDensityModel;
use hf_core::{Error, FitResult, Result};
use hf_model::HistFactoryModel;
use nalgebra::DMatrix;

/// Adapts a model's search objective to the optimizer.
struct NllObjective<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
}

impl<M: LogDensityModel + ?Sized> ObjectiveFunction for NllObjective<'_, M> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.model.search_nll(params)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.model.grad_nll(params)
    }
}

/// Maximum Likelihood Estimator
///
/// Fits statistical models by minimizing the negative log-likelihood.
#[derive(Debug, Clone, Default)]
pub struct MaximumLikelihoodEstimator {
    config: OptimizerConfig,
}

impl MaximumLikelihoodEstimator {
    /// Create a new MLE with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create MLE with custom optimizer configuration
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Access the optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fit any [`LogDensityModel`], with uncertainties and covariance from the Hessian.
    ///
    /// Parameters whose bounds coincide are held fixed and get zero uncertainty.
    pub fn fit<M: LogDensityModel>(&self, model: &M) -> Result<FitResult> {
        self.fit_from(model, &model.parameter_init())
    }

    /// Like [`fit`](Self::fit), starting from `initial_params`.
    pub fn fit_from<M: LogDensityModel>(&self, model: &M, initial_params: &[f64]) -> Result<FitResult> {
        let bounds = model.parameter_bounds();
        let result = self.fit_minimum_from(model, initial_params, &bounds)?;
        let n = result.parameters.len();
        let free: Vec<usize> = (0..n).filter(|&i| bounds[i].0 < bounds[i].1).collect();

        let hessian = self.compute_hessian(model, &result.parameters, &free)?;
        let k = free.len();
        let mut uncertainties = vec![0.0; n];

        let fr = match self.invert_hessian(&hessian) {
            Some(cov_free) => {
                let mut cov = vec![0.0; n * n];
                for (a, &i) in free.iter().enumerate() {
                    for (b, &j) in free.iter().enumerate() {
                        cov[i * n + j] = cov_free[(a, b)];
                    }
                    uncertainties[i] = cov_free[(a, a)].sqrt();
                }
                FitResult::new(
                    result.parameters,
                    uncertainties,
                    result.fval,
                    result.converged,
                    result.n_iter as usize,
                    result.n_fev,
                )
                .with_covariance(cov)
            }
            None => {
                log::warn!("Hessian inversion failed, using diagonal approximation");
                for (a, u) in self.diagonal_uncertainties(&hessian, k).into_iter().enumerate() {
                    uncertainties[free[a]] = u;
                }
                FitResult::new(
                    result.parameters,
                    uncertainties,
                    result.fval,
                    result.converged,
                    result.n_iter as usize,
                    result.n_fev,
                )
            }
        };
        Ok(fr)
    }

    /// Minimize the NLL from the model's suggested start inside its bounds.
    ///
    /// Fast path without Hessian, used by hypothesis tests.
    pub fn fit_minimum<M: LogDensityModel + ?Sized>(&self, model: &M) -> Result<OptimizationResult> {
        self.fit_minimum_from(model, &model.parameter_init(), &model.parameter_bounds())
    }

    /// Minimize the NLL from `initial_params` inside `bounds`.
    ///
    /// Fixing a parameter means giving it equal bounds. The reported `fval` is the
    /// model's strict NLL at the optimum. A run that stops short of the tolerance
    /// (iteration budget spent, or no projected step lowers the NLL) is accepted
    /// only if its projected gradient is below `sqrt(max(tol, 1e-6))`; otherwise
    /// this fails with [`Error::FitConvergence`].
    pub fn fit_minimum_from<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        initial_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if initial_params.len() != model.dim() || bounds.len() != model.dim() {
            return Err(Error::Validation(format!(
                "fit_minimum_from: got {} initial values and {} bounds for {} parameters",
                initial_params.len(),
                bounds.len(),
                model.dim()
            )));
        }

        let objective = NllObjective { model };
        let optimizer = LbfgsbOptimizer::new(self.config.clone());
        let mut result = optimizer.minimize(&objective, initial_params, bounds)?;

        if !result.converged {
            let mut g = model.grad_nll(&result.parameters)?;
            project_gradient(&result.parameters, &mut g, bounds);
            let gmax = g.iter().fold(0.0_f64, |a, &b| a.max(b.abs()));
            if gmax <= self.config.tol.max(1e-6).sqrt() {
                log::warn!(
                    "optimizer stopped with '{}' but projected gradient is {:.3e}; accepting",
                    result.message,
                    gmax
                );
                result.converged = true;
            } else {
                return Err(Error::FitConvergence {
                    message: format!("{} (projected gradient {:.3e})", result.message, gmax),
                    n_iter: result.n_iter,
                });
            }
        }

        result.fval = model.nll(&result.parameters)?;
        Ok(result)
    }

    /// Fit `model` to `data` with some parameters held at given values.
    ///
    /// Returns the best-fit parameters and `-2 ln L` at the optimum.
    pub fn fit_with_fixed(
        &self,
        model: &HistFactoryModel,
        data: &[f64],
        fixed: &[(usize, f64)],
    ) -> Result<(Vec<f64>, f64)> {
        let likelihood = model.likelihood(data)?;
        let mut init = model.suggested_init();
        let mut bounds = model.suggested_bounds();
        fix_parameters(&mut init, &mut bounds, fixed)?;
        let result = self.fit_minimum_from(&likelihood, &init, &bounds)?;
        Ok((result.parameters, 2.0 * result.fval))
    }

    /// Hessian of the NLL in the `free` subspace, by forward differences of the gradient.
    fn compute_hessian<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        best_params: &[f64],
        free: &[usize],
    ) -> Result<DMatrix<f64>> {
        let k = free.len();
        let grad_center = model.grad_nll(best_params)?;
        let mut hessian = DMatrix::zeros(k, k);
        let mut work = best_params.to_vec();

        for (b, &j) in free.iter().enumerate() {
            let eps = 1e-4 * best_params[j].abs().max(1.0);
            work[j] = best_params[j] + eps;
            let grad_plus = model.grad_nll(&work)?;
            work[j] = best_params[j];
            for (a, &i) in free.iter().enumerate() {
                hessian[(a, b)] = (grad_plus[i] - grad_center[i]) / eps;
            }
        }

        let ht = hessian.transpose();
        Ok((&hessian + &ht) * 0.5)
    }

    /// Covariance from a damped Cholesky solve; `None` if the Hessian stays indefinite.
    fn invert_hessian(&self, hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let n = hessian.nrows();
        let identity = DMatrix::identity(n, n);
        let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

        let mut h_damped = hessian.clone();
        let mut damping = 0.0_f64;
        for _ in 0..10 {
            if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
                let cov = chol.solve(&identity);
                if (0..n).all(|i| cov[(i, i)].is_finite() && cov[(i, i)] > 0.0) {
                    return Some(cov);
                }
                return None;
            }
            let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
            for i in 0..n {
                h_damped[(i, i)] += next - damping;
            }
            damping = next;
        }
        None
    }

    fn diagonal_uncertainties(&self, hessian: &DMatrix<f64>, n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 / hessian[(i, i)].abs().max(1e-12).sqrt()).collect()
    }
}

/// Pin `fixed` parameters: equal bounds and the value as starting point.
pub(crate) fn fix_parameters(
    init: &mut [f64],
    bounds: &mut [(f64, f64)],
    fixed: &[(usize, f64)],
) -> Result<()> {
    for &(i, v) in fixed {
        if i >= init.len() || !v.is_finite() {
            return Err(Error::Validation(format!(
                "cannot fix parameter {} to {} in a model with {} parameters",
                i,
                v,
                init.len()
            )));
        }
        init[i] = v;
        bounds[i] = (v, v);
    }
    Ok(())
}

/// Fit `model` to `data`, holding `fixed` parameters at their values.
///
/// Returns the best-fit parameters and twice the negative log-likelihood.
pub fn fit(model: &HistFactoryModel, data: &[f64], fixed: &[(usize, f64)]) -> Result<(Vec<f64>, f64)> {
    MaximumLikelihoodEstimator::new().fit_with_fixed(model, data, fixed)
}

/// Fit with the parameter of interest held at `mu`.
pub fn fixed_poi_fit(model: &HistFactoryModel, data: &[f64], mu: f64) -> Result<(Vec<f64>, f64)> {
    fit(model, data, &[(model.poi_index(), mu)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hf_model::{ModifierSettings, Workspace};

    fn workspace(json: &str) -> Workspace {
        Workspace::from_json_str(json).unwrap()
    }

    fn simple() -> (HistFactoryModel, Vec<f64>) {
        let ws = workspace(include_str!("../../../tests/fixtures/simple_workspace.json"));
        let model = ws.model(None, &[], &ModifierSettings::default()).unwrap();
        let data = ws.data(&model, true).unwrap();
        (model, data)
    }

    fn complex() -> (HistFactoryModel, Vec<f64>) {
        let ws = workspace(include_str!("../../../tests/fixtures/complex_workspace.json"));
        let model = ws.model(Some("GaussExample"), &[], &ModifierSettings::default()).unwrap();
        let data = ws.data(&model, true).unwrap();
        (model, data)
    }

    #[test]
    fn test_fit_simple() {
        let (model, data) = simple();
        let lik = model.likelihood(&data).unwrap();
        let result = MaximumLikelihoodEstimator::new().fit(&lik).unwrap();

        assert!(result.converged);
        let poi = result.parameters[model.poi_index()];
        assert!(poi >= 0.0 && poi < 1.0, "mu_hat = {}", poi);
        for (i, &u) in result.uncertainties.iter().enumerate() {
            assert!(u > 0.0 && u.is_finite() && u < 1e3, "uncertainty[{}] = {}", i, u);
        }
        assert_relative_eq!(result.nll, lik.nll(&result.parameters).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_covariance_matches_uncertainties() {
        let (model, data) = simple();
        let lik = model.likelihood(&data).unwrap();
        let result = MaximumLikelihoodEstimator::new().fit(&lik).unwrap();
        let n = result.parameters.len();
        let cov = result.covariance.as_ref().expect("covariance");
        assert_eq!(cov.len(), n * n);

        for i in 0..n {
            assert_relative_eq!(cov[i * n + i], result.uncertainties[i].powi(2), max_relative = 1e-10);
            for j in 0..n {
                let rho = result.correlation(i, j).unwrap();
                assert!((-1.0 - 1e-10..=1.0 + 1e-10).contains(&rho), "rho[{},{}] = {}", i, j, rho);
            }
        }
    }

    #[test]
    fn test_fixed_parameter_has_zero_uncertainty() {
        let (model, data) = complex();
        let lik = model.likelihood(&data).unwrap();
        let result = MaximumLikelihoodEstimator::new().fit(&lik).unwrap();
        let k = model.parameter_index("sig_xsec").unwrap();

        assert_eq!(result.parameters[k], 0.0);
        assert_eq!(result.uncertainties[k], 0.0);
        assert!(result.correlation(k, 0).is_none());
        let lumi = model.parameter_index("lumi").unwrap();
        assert!(result.uncertainties[lumi] > 0.0);
    }

    #[test]
    fn test_conditional_nll_not_below_unconditional() {
        let (model, data) = complex();
        let (_, free) = fit(&model, &data, &[]).unwrap();
        for mu in [0.0, 0.5, 1.0, 2.0, 5.0] {
            let (pars, fixed) = fixed_poi_fit(&model, &data, mu).unwrap();
            assert_eq!(pars[model.poi_index()], mu);
            assert!(fixed >= free - 1e-6, "mu={} fixed={} free={}", mu, fixed, free);
        }
    }

    #[test]
    fn test_optimum_independent_of_start() {
        let (model, data) = simple();
        let lik = model.likelihood(&data).unwrap();
        let mle = MaximumLikelihoodEstimator::new();
        let bounds = model.suggested_bounds();

        let a = mle.fit_minimum(&lik).unwrap();
        let b = mle.fit_minimum_from(&lik, &[3.0, 1.2, 0.8], &bounds).unwrap();
        assert_relative_eq!(a.fval, b.fval, epsilon = 1e-6);
        for (x, y) in a.parameters.iter().zip(&b.parameters) {
            assert_relative_eq!(x, y, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_twice_nll_is_reported() {
        let (model, data) = simple();
        let (pars, twice) = fit(&model, &data, &[]).unwrap();
        assert_relative_eq!(twice, model.twice_nll(&pars, &data).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_iteration_budget_exhaustion_is_fit_convergence_error() {
        let (model, data) = complex();
        let lik = model.likelihood(&data).unwrap();
        let mle = MaximumLikelihoodEstimator::with_config(OptimizerConfig { max_iter: 1, tol: 1e-10, m: 10 });
        let err = mle.fit_minimum(&lik).unwrap_err();
        assert!(matches!(err, Error::FitConvergence { .. }), "{}", err);
    }

    #[test]
    fn test_fix_parameters_validation() {
        let (model, data) = simple();
        assert!(matches!(fit(&model, &data, &[(17, 1.0)]), Err(Error::Validation(_))));
        assert!(matches!(fit(&model, &data, &[(0, f64::NAN)]), Err(Error::Validation(_))));
        assert!(matches!(fit(&model, &data[..1], &[]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_hessian_is_symmetric() {
        let (model, data) = complex();
        let lik = model.likelihood(&data).unwrap();
        let mle = MaximumLikelihoodEstimator::new();
        let best = mle.fit_minimum(&lik).unwrap();
        let free: Vec<usize> = (0..model.n_params()).collect();
        let h = mle.compute_hessian(&lik, &best.parameters, &free).unwrap();
        for i in 0..h.nrows() {
            for j in 0..h.ncols() {
                assert_eq!(h[(i, j)], h[(j, i)]);
            }
        }
    }
}
