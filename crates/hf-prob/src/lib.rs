//! Probability building blocks for histfit likelihoods.
//!
//! - [`poisson`]: main-measurement bins and Poisson-constrained auxiliary counts
//! - [`normal`]: Gaussian constraint terms and the standard normal CDF used for p-values

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod normal;
pub mod poisson;
