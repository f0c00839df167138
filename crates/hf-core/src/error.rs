//! Error types for histfit

use thiserror::Error;

/// histfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or self-inconsistent model declaration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A patch operation did not resolve against the declaration
    #[error("Patch error: {0}")]
    Patch(String),

    /// The optimizer did not reach its tolerance within the iteration budget
    #[error("Fit did not converge after {n_iter} iterations: {message}")]
    FitConvergence {
        /// Termination message reported by the optimizer.
        message: String,
        /// Iterations performed.
        n_iter: u64,
    },

    /// A quantity left its mathematical domain (log of a non-positive yield, NaN probability)
    #[error("Numeric domain error: {0}")]
    NumericDomain(String),

    /// Invalid arguments at an API boundary (lengths, ranges)
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_convergence_message() {
        let err = Error::FitConvergence { message: "MaxItersReached".to_string(), n_iter: 1000 };
        assert_eq!(err.to_string(), "Fit did not converge after 1000 iterations: MaxItersReached");
    }

    #[test]
    fn test_json_error_converts() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
