//! Common data types for histfit

use serde::{Deserialize, Serialize};

/// Fit result containing parameter estimates and uncertainties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Parameter uncertainties (sqrt of covariance diagonal); zero for fixed parameters
    pub uncertainties: Vec<f64>,

    /// Covariance matrix (row-major, N×N). `None` if Hessian inversion failed.
    pub covariance: Option<Vec<f64>>,

    /// Negative log-likelihood at minimum
    pub nll: f64,

    /// Convergence status
    pub converged: bool,

    /// Number of optimizer iterations
    pub n_iter: usize,

    /// Number of objective evaluations
    pub n_fev: usize,
}

impl FitResult {
    /// Create a new fit result
    pub fn new(
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        nll: f64,
        converged: bool,
        n_iter: usize,
        n_fev: usize,
    ) -> Self {
        Self { parameters, uncertainties, covariance: None, nll, converged, n_iter, n_fev }
    }

    /// Attach a covariance matrix
    pub fn with_covariance(mut self, covariance: Vec<f64>) -> Self {
        self.covariance = Some(covariance);
        self
    }

    /// `-2 ln L` at the minimum
    pub fn twice_nll(&self) -> f64 {
        2.0 * self.nll
    }

    /// Get correlation matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let n = self.parameters.len();
        if i >= n || j >= n {
            return None;
        }
        let sigma_i = self.uncertainties[i];
        let sigma_j = self.uncertainties[j];
        if sigma_i <= 0.0 || sigma_j <= 0.0 {
            return None;
        }
        Some(cov[i * n + j] / (sigma_i * sigma_j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_result() {
        let result = FitResult::new(vec![1.0, 2.0], vec![0.1, 0.2], 123.45, true, 12, 40);
        assert_eq!(result.parameters.len(), 2);
        assert_eq!(result.twice_nll(), 246.9);
        assert!(result.correlation(0, 1).is_none());
    }

    #[test]
    fn test_correlation_from_covariance() {
        let cov = vec![0.01, 0.01, 0.01, 0.04];
        let result =
            FitResult::new(vec![1.0, 2.0], vec![0.1, 0.2], 1.0, true, 1, 1).with_covariance(cov);
        let rho = result.correlation(0, 1).unwrap();
        assert!((rho - 0.5).abs() < 1e-12);
        assert!(result.correlation(2, 0).is_none());
    }
}
