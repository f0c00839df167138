//! Workspace JSON schema.
//!
//! These types mirror the pyhf workspace layout one-to-one so that published
//! likelihoods (HEPData) parse without conversion.

use hf_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level workspace document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Channels (regions)
    pub channels: Vec<Channel>,
    /// Observed counts, one entry per channel
    pub observations: Vec<Observation>,
    /// Measurements (POI + parameter configuration)
    pub measurements: Vec<Measurement>,
    /// Schema version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Channel (region)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name
    pub name: String,
    /// Samples in this channel
    pub samples: Vec<Sample>,
}

/// Sample (process)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample name
    pub name: String,
    /// Nominal expected counts per bin
    pub data: Vec<f64>,
    /// Modifiers
    pub modifiers: Vec<Modifier>,
}

/// Modifier, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Modifier {
    /// Free normalisation factor.
    #[serde(rename = "normfactor")]
    NormFactor {
        /// Parameter name.
        name: String,
        /// Unused payload (`null` in pyhf documents).
        #[serde(default)]
        data: Option<Value>,
    },

    /// Normalisation systematic with relative `hi`/`lo` factors.
    #[serde(rename = "normsys")]
    NormSys {
        /// Parameter name.
        name: String,
        /// Relative variations.
        data: NormSysData,
    },

    /// Shape systematic with up/down templates.
    #[serde(rename = "histosys")]
    HistoSys {
        /// Parameter name.
        name: String,
        /// Templates.
        data: HistoSysData,
    },

    /// Per-bin uncorrelated uncertainty with a Poisson (Barlow-Beeston) constraint.
    #[serde(rename = "shapesys")]
    ShapeSys {
        /// Parameter name.
        name: String,
        /// Absolute per-bin uncertainties.
        data: Vec<f64>,
    },

    /// Free per-bin factors.
    #[serde(rename = "shapefactor")]
    ShapeFactor {
        /// Parameter name.
        name: String,
        /// Unused payload.
        #[serde(default)]
        data: Option<Value>,
    },

    /// MC statistical uncertainty, Gaussian constrained per bin.
    #[serde(rename = "staterror")]
    StatError {
        /// Parameter name.
        name: String,
        /// Absolute per-bin uncertainties.
        data: Vec<f64>,
    },

    /// Luminosity.
    #[serde(rename = "lumi")]
    Lumi {
        /// Parameter name.
        name: String,
        /// Unused payload.
        #[serde(default)]
        data: Option<Value>,
    },
}

impl Modifier {
    /// Parameter name referenced by this modifier.
    pub fn name(&self) -> &str {
        match self {
            Modifier::NormFactor { name, .. }
            | Modifier::NormSys { name, .. }
            | Modifier::HistoSys { name, .. }
            | Modifier::ShapeSys { name, .. }
            | Modifier::ShapeFactor { name, .. }
            | Modifier::StatError { name, .. }
            | Modifier::Lumi { name, .. } => name,
        }
    }

    /// The `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Modifier::NormFactor { .. } => "normfactor",
            Modifier::NormSys { .. } => "normsys",
            Modifier::HistoSys { .. } => "histosys",
            Modifier::ShapeSys { .. } => "shapesys",
            Modifier::ShapeFactor { .. } => "shapefactor",
            Modifier::StatError { .. } => "staterror",
            Modifier::Lumi { .. } => "lumi",
        }
    }
}

/// normsys payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormSysData {
    /// Factor at alpha = +1
    pub hi: f64,
    /// Factor at alpha = -1
    pub lo: f64,
}

/// histosys payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoSysData {
    /// Template at alpha = +1
    pub hi_data: Vec<f64>,
    /// Template at alpha = -1
    pub lo_data: Vec<f64>,
}

/// Observed counts of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Channel name
    pub name: String,
    /// Observed event counts per bin
    pub data: Vec<f64>,
}

/// Named measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Measurement name
    pub name: String,
    /// Configuration
    pub config: MeasurementConfig,
}

/// Measurement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Parameter of interest
    pub poi: String,
    /// Parameter overrides
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

/// Per-parameter overrides. Vector-valued entries address per-bin parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Parameter name
    pub name: String,
    /// Initial values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inits: Vec<f64>,
    /// Bounds `[[min, max], ...]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<[f64; 2]>,
    /// Hold at the initial value in fits
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fixed: bool,
    /// Auxiliary measurement centres
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auxdata: Vec<f64>,
    /// Constraint widths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sigmas: Vec<f64>,
}

/// The part of a workspace that defines a model: `{channels, parameters}`.
///
/// Patches are applied to this document (as JSON), so patch paths such as
/// `/channels/0/samples/-` index the channels in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Channels
    pub channels: Vec<Channel>,
    /// Parameter overrides from the chosen measurement
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

impl Workspace {
    /// Parse a workspace from JSON text.
    ///
    /// Malformed JSON is an [`Error::Json`]; well-formed JSON that does not match the
    /// schema (e.g. an unknown modifier type) is an [`Error::Configuration`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a workspace from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Configuration(format!("invalid workspace: {}", e)))
    }

    /// Find a measurement by name, or the first one when `name` is `None`.
    pub fn measurement(&self, name: Option<&str>) -> Result<&Measurement> {
        match name {
            Some(name) => self.measurements.iter().find(|m| m.name == name).ok_or_else(|| {
                Error::Configuration(format!("workspace has no measurement named '{}'", name))
            }),
            None => self
                .measurements
                .first()
                .ok_or_else(|| Error::Configuration("workspace has no measurements".to_string())),
        }
    }

    /// Observed counts of one channel.
    pub fn observation(&self, channel: &str) -> Option<&[f64]> {
        self.observations.iter().find(|o| o.name == channel).map(|o| o.data.as_slice())
    }

    /// Model specification for a measurement.
    pub fn model_spec(&self, measurement: &Measurement) -> ModelSpec {
        ModelSpec {
            channels: self.channels.clone(),
            parameters: measurement.config.parameters.clone(),
        }
    }
}
