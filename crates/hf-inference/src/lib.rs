//! # hf-inference
//!
//! Statistical inference for histfit models.
//!
//! This crate provides:
//! - bounded L-BFGS minimisation of any [`hf_core::traits::LogDensityModel`]
//! - maximum-likelihood fits with Hessian-based uncertainties
//! - asymptotic CLs hypothesis tests, parallel scans and upper limits
//!
//! Nothing here knows how a likelihood is assembled; models come from `hf-model`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Asymptotic CLs hypothesis tests (`q_mu`, `qtilde_mu`).
pub mod hypotest;
/// Maximum-likelihood estimation.
pub mod mle;
/// Bounded quasi-Newton optimizer (argmin L-BFGS).
pub mod optimizer;

pub use hypotest::{
    AsymptoticCalculator, HypotestOptions, HypotestResult, NSIGMA, UpperLimit, hypotest, hypotest_scan,
    upper_limit,
};
pub use mle::{MaximumLikelihoodEstimator, fit, fixed_poi_fit};
pub use optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
