//! # hf-ad
//!
//! Automatic differentiation primitives for histfit.
//!
//! - **Forward-mode AD** via [`dual::Dual`] numbers
//! - [`scalar::Scalar`] trait for writing likelihood code once, generic over `f64` and `Dual`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dual;
pub mod scalar;

pub use dual::Dual;
pub use scalar::Scalar;
