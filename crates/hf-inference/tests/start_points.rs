//! Fits of the complex fixture must reach one optimum from anywhere in the box.

use approx::assert_relative_eq;
use hf_inference::{MaximumLikelihoodEstimator, OptimizerConfig};
use hf_model::{HistFactoryModel, InterpCode, ModifierSettings, Workspace};

fn complex(measurement: &str) -> (HistFactoryModel, Vec<f64>) {
    let ws = Workspace::from_json_str(include_str!("../../../tests/fixtures/complex_workspace.json")).unwrap();
    let settings = ModifierSettings::new(InterpCode::Code4, InterpCode::Code4p);
    let model = ws.model(Some(measurement), &[], &settings).unwrap();
    let data = ws.data(&model, true).unwrap();
    (model, data)
}

/// Start `k`: each parameter sits between 5% and 45% of its range, with the
/// fraction varying from one parameter to the next.
fn start_point(bounds: &[(f64, f64)], k: usize) -> Vec<f64> {
    bounds
        .iter()
        .enumerate()
        .map(|(i, &(lo, hi))| {
            let step = (7 * k + 3 * i) % 20;
            lo + (0.05 + 0.4 * step as f64 / 19.0) * (hi - lo)
        })
        .collect()
}

#[test]
fn test_fit_reaches_same_optimum_from_spread_of_starts() {
    for measurement in ["GaussExample", "FreeXsec"] {
        let (model, data) = complex(measurement);
        let lik = model.likelihood(&data).unwrap();
        let mle = MaximumLikelihoodEstimator::new();
        let bounds = model.suggested_bounds();
        let reference = mle.fit_minimum(&lik).unwrap();
        assert!(reference.converged, "{}: {}", measurement, reference.message);

        for k in 0..20 {
            let start = start_point(&bounds, k);
            let r = mle
                .fit_minimum_from(&lik, &start, &bounds)
                .unwrap_or_else(|e| panic!("{} start {}: {}", measurement, k, e));
            assert_relative_eq!(r.fval, reference.fval, epsilon = 1e-6);
            let mu = model.poi_index();
            assert_relative_eq!(r.parameters[mu], reference.parameters[mu], epsilon = 1e-3);
        }
    }
}

#[test]
fn test_tight_tolerance_still_fits() {
    let (model, data) = complex("FreeXsec");
    let lik = model.likelihood(&data).unwrap();
    let reference = MaximumLikelihoodEstimator::new().fit_minimum(&lik).unwrap();

    let tight = MaximumLikelihoodEstimator::with_config(OptimizerConfig { tol: 1e-11, ..Default::default() });
    let r = tight.fit_minimum(&lik).unwrap();
    assert!(r.fval <= reference.fval + 1e-6, "tight {} vs default {}", r.fval, reference.fval);
    assert_relative_eq!(r.fval, reference.fval, epsilon = 1e-6);
}
