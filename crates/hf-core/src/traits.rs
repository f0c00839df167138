//! Core traits for histfit
//!
//! The inference crate fits anything implementing [`LogDensityModel`]; it never
//! depends on how a likelihood is assembled from channels and modifiers.

use crate::Result;

/// A negative log-likelihood over a fixed-length parameter vector.
///
/// Observed data is bound into the implementor, so `nll` is a pure function of the
/// parameters.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters
    fn dim(&self) -> usize;

    /// Parameter names, in parameter-vector order
    fn parameter_names(&self) -> Vec<String>;

    /// Parameter bounds (min, max). Fixed parameters have `min == max`.
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Suggested starting point
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-likelihood. Fails with `NumericDomain` outside the model's domain.
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Objective evaluated at optimizer trial points.
    ///
    /// Implementors may regularise the domain here so that a line search can back
    /// off from infeasible points; values reported to callers always come from [`nll`].
    ///
    /// [`nll`]: LogDensityModel::nll
    fn search_nll(&self, params: &[f64]) -> Result<f64> {
        self.nll(params)
    }

    /// Gradient of [`search_nll`](LogDensityModel::search_nll)
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;
}

/// Models with a distinguished parameter of interest.
pub trait PoiModel {
    /// Index of the parameter of interest, if any
    fn poi_index(&self) -> Option<usize>;
}
