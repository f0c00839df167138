//! Small ready-made workspaces for tests and tutorials.

use crate::schema::{
    Channel, HistoSysData, Measurement, MeasurementConfig, Modifier, Observation, Sample, Workspace,
};
use hf_core::{Error, Result};

fn check_lengths(signal: &[f64], others: &[(&str, &[f64])]) -> Result<()> {
    if signal.is_empty() {
        return Err(Error::Validation("signal must not be empty".to_string()));
    }
    for (what, v) in others {
        if v.len() != signal.len() {
            return Err(Error::Validation(format!(
                "{} has {} bins but signal has {}",
                what,
                v.len(),
                signal.len()
            )));
        }
    }
    Ok(())
}

fn single_channel(signal: &[f64], bkg: &[f64], bkg_modifier: Modifier) -> Workspace {
    Workspace {
        channels: vec![Channel {
            name: "singlechannel".to_string(),
            samples: vec![
                Sample {
                    name: "signal".to_string(),
                    data: signal.to_vec(),
                    modifiers: vec![Modifier::NormFactor { name: "mu".to_string(), data: None }],
                },
                Sample { name: "background".to_string(), data: bkg.to_vec(), modifiers: vec![bkg_modifier] },
            ],
        }],
        observations: vec![Observation {
            name: "singlechannel".to_string(),
            data: bkg.iter().zip(signal).map(|(b, s)| b + s).collect(),
        }],
        measurements: vec![Measurement {
            name: "Measurement".to_string(),
            config: MeasurementConfig { poi: "mu".to_string(), parameters: vec![] },
        }],
        version: Some("1.0.0".to_string()),
    }
}

/// One channel with a signal sample (`mu`) and a background whose per-bin
/// uncertainties are uncorrelated (`shapesys`). Observations are set to `signal + bkg`.
pub fn uncorrelated_background(signal: &[f64], bkg: &[f64], bkg_uncertainty: &[f64]) -> Result<Workspace> {
    check_lengths(signal, &[("bkg", bkg), ("bkg_uncertainty", bkg_uncertainty)])?;
    Ok(single_channel(
        signal,
        bkg,
        Modifier::ShapeSys { name: "uncorr_bkguncrt".to_string(), data: bkg_uncertainty.to_vec() },
    ))
}

/// One channel with a signal sample (`mu`) and a background with a correlated
/// shape uncertainty (`histosys`).
pub fn correlated_background(
    signal: &[f64],
    bkg: &[f64],
    bkg_up: &[f64],
    bkg_down: &[f64],
) -> Result<Workspace> {
    check_lengths(signal, &[("bkg", bkg), ("bkg_up", bkg_up), ("bkg_down", bkg_down)])?;
    Ok(single_channel(
        signal,
        bkg,
        Modifier::HistoSys {
            name: "correlated_bkg_uncertainty".to_string(),
            data: HistoSysData { hi_data: bkg_up.to_vec(), lo_data: bkg_down.to_vec() },
        },
    ))
}
