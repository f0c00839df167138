//! # hf-core
//!
//! Shared foundation for histfit: the error taxonomy, the traits that let the
//! inference crate stay independent of concrete model types, and fit results.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::FitResult;
