//! Workspace operations: deriving models and observed data.

use crate::interp::ModifierSettings;
use crate::model::{HistFactoryModel, build};
use crate::patch::Patch;
use crate::schema::Workspace;
use hf_core::{Error, Result};

impl Workspace {
    /// Build the model of a measurement (the first one when `measurement` is `None`).
    ///
    /// `patches` are applied in order to the `{channels, parameters}` specification;
    /// the workspace itself is left untouched.
    pub fn model(
        &self,
        measurement: Option<&str>,
        patches: &[Patch],
        settings: &ModifierSettings,
    ) -> Result<HistFactoryModel> {
        let m = self.measurement(measurement)?;
        log::debug!("building model for measurement '{}' with {} patch(es)", m.name, patches.len());
        build(&self.model_spec(m), patches, &m.config.poi, settings)
    }

    /// Observed data in model order: main bins by channel, then (optionally) the
    /// auxiliary observations of constrained parameters.
    pub fn data(&self, model: &HistFactoryModel, include_auxdata: bool) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(model.n_main() + model.n_aux());
        for (name, n_bins) in model.channel_names().into_iter().zip(model.channel_bins()) {
            let obs = self.observation(name).ok_or_else(|| {
                Error::Configuration(format!("workspace has no observations for channel '{}'", name))
            })?;
            if obs.len() != n_bins {
                return Err(Error::Configuration(format!(
                    "channel '{}' has {} observed bins, expected {}",
                    name,
                    obs.len(),
                    n_bins
                )));
            }
            out.extend_from_slice(obs);
        }
        if include_auxdata {
            out.extend(model.auxdata());
        }
        Ok(out)
    }
}
