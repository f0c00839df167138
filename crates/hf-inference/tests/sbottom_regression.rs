//! Regression against the published sbottom Region A likelihood (HEPData).
//!
//! Needs `RegionA/BkgOnly.json` and `RegionA/patch.sbottom_1300_205_60.json`
//! extracted under the directory named by `HISTFIT_SBOTTOM_DIR`:
//!
//! ```text
//! HISTFIT_SBOTTOM_DIR=/path/to/sbottom cargo test -p hf-inference --test sbottom_regression -- --ignored
//! ```

use approx::assert_relative_eq;
use hf_inference::{HypotestOptions, hypotest};
use hf_model::{InterpCode, ModifierSettings, Workspace, parse_patch};
use std::path::PathBuf;

fn sbottom_dir() -> Option<PathBuf> {
    std::env::var_os("HISTFIT_SBOTTOM_DIR").map(PathBuf::from)
}

#[test]
#[ignore = "needs the HEPData sbottom likelihoods"]
fn test_sbottom_region_a() {
    let Some(dir) = sbottom_dir() else {
        eprintln!("HISTFIT_SBOTTOM_DIR not set, skipping");
        return;
    };
    let bkg = std::fs::read_to_string(dir.join("RegionA/BkgOnly.json")).unwrap();
    let patch = std::fs::read_to_string(dir.join("RegionA/patch.sbottom_1300_205_60.json")).unwrap();

    let ws = Workspace::from_json_str(&bkg).unwrap();
    let patch = parse_patch(&patch).unwrap();
    let settings = ModifierSettings::new(InterpCode::Code4, InterpCode::Code4p);
    let model = ws.model(None, &[patch], &settings).unwrap();
    let data = ws.data(&model, true).unwrap();

    let options = HypotestOptions { qtilde: true, return_expected_set: true, ..Default::default() };
    let r = hypotest(1.0, &data, &model, options).unwrap();

    assert_relative_eq!(r.cls, 0.2444363575448201, max_relative = 1e-5);
    let expected = [
        0.0902252193974136,
        0.1937841171543251,
        0.3843236961508878,
        0.6557759457699649,
        0.8910421945189615,
    ];
    for (got, want) in r.expected.unwrap().iter().zip(expected) {
        assert_relative_eq!(*got, want, max_relative = 1e-5);
    }
}
