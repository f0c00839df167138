//! HistFactory model
//!
//! Compiles a [`ModelSpec`] into an evaluable model: an ordered parameter vector,
//! per-bin expected yields and the likelihood
//!
//! ```text
//! L(n, a | θ) = Π_bins Pois(n_b | ν_b(θ)) · Π_constrained p(a_j | θ_j)
//! ```
//!
//! where `ν_b = Σ_samples (nominal + Σ deltas) · Π factors`. Parameter values are
//! never stored on the model; they are passed to every evaluation.

use crate::interp::{ModifierSettings, histosys_delta, normsys_factor};
use crate::patch::{Patch, apply_patches};
use crate::schema::{ModelSpec, Modifier, ParameterConfig};
use hf_ad::Scalar;
use hf_ad::scalar::gradient;
use hf_core::traits::{LogDensityModel, PoiModel};
use hf_core::{Error, Result};
use hf_prob::{normal, poisson};
use std::collections::HashMap;

/// Lower bound of per-bin gamma factors that carry a constraint.
const GAMMA_LO: f64 = 1e-10;
/// Upper bound of multiplicative factors.
const FACTOR_HI: f64 = 10.0;
/// Floor applied to expected counts at optimizer trial points.
const SEARCH_FLOOR: f64 = 1e-10;

/// Auxiliary measurement constraining a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// Gaussian around `center` with width `sigma`; the expected aux value is the parameter.
    Normal {
        /// Auxiliary observation
        center: f64,
        /// Width
        sigma: f64,
    },
    /// Poisson with scale `tau`; aux observation `tau`, expected aux value `gamma * tau`.
    Poisson {
        /// Barlow-Beeston scale `(nominal / sigma)^2`
        tau: f64,
    },
}

impl Constraint {
    /// Auxiliary observation of the nominal dataset.
    pub fn auxdata(&self) -> f64 {
        match *self {
            Constraint::Normal { center, .. } => center,
            Constraint::Poisson { tau } => tau,
        }
    }

    /// Expected auxiliary observation for a parameter value.
    pub fn expected<T: Scalar>(&self, value: T) -> T {
        match *self {
            Constraint::Normal { .. } => value,
            Constraint::Poisson { tau } => value * T::from_f64(tau),
        }
    }
}

/// Model parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name; per-bin parameters are named `<set>[<bin>]`
    pub name: String,
    /// Suggested initial value
    pub init: f64,
    /// Bounds (min, max)
    pub bounds: (f64, f64),
    /// Held at `init` in fits
    pub fixed: bool,
    /// Auxiliary constraint, `None` for free parameters
    pub constraint: Option<Constraint>,
}

/// Modifier category that owns a parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetKind {
    NormFactor,
    Lumi,
    /// normsys and histosys share N(0, 1) parameters
    Alpha,
    ShapeSys,
    StatError,
    ShapeFactor,
}

impl SetKind {
    fn of(m: &Modifier) -> Self {
        match m {
            Modifier::NormFactor { .. } => SetKind::NormFactor,
            Modifier::Lumi { .. } => SetKind::Lumi,
            Modifier::NormSys { .. } | Modifier::HistoSys { .. } => SetKind::Alpha,
            Modifier::ShapeSys { .. } => SetKind::ShapeSys,
            Modifier::StatError { .. } => SetKind::StatError,
            Modifier::ShapeFactor { .. } => SetKind::ShapeFactor,
        }
    }

    fn per_bin(self) -> bool {
        matches!(self, SetKind::ShapeSys | SetKind::StatError | SetKind::ShapeFactor)
    }
}

/// Named group of parameters (one entry for scalars, one per bin otherwise).
#[derive(Debug, Clone)]
struct ParamSet {
    kind: SetKind,
    declared_as: &'static str,
    first: usize,
    len: usize,
}

#[derive(Debug, Clone)]
struct ModelChannel {
    name: String,
    n_bins: usize,
    samples: Vec<ModelSample>,
}

#[derive(Debug, Clone)]
struct ModelSample {
    nominal: Vec<f64>,
    modifiers: Vec<ModelModifier>,
}

#[derive(Debug, Clone)]
enum ModelModifier {
    /// Scalar factor taken directly from a parameter (normfactor, lumi).
    Scale { param_idx: usize },
    NormSys { param_idx: usize, lo: f64, hi: f64 },
    HistoSys { param_idx: usize, lo: Vec<f64>, hi: Vec<f64> },
    /// Per-bin factors (shapesys, staterror, shapefactor).
    PerBin { param_indices: Vec<usize> },
}

/// Compiled HistFactory model.
#[derive(Debug, Clone)]
pub struct HistFactoryModel {
    parameters: Vec<Parameter>,
    param_sets: HashMap<String, ParamSet>,
    poi_index: usize,
    channels: Vec<ModelChannel>,
    /// Constrained parameter indices, in parameter order.
    aux_params: Vec<usize>,
    settings: ModifierSettings,
}

/// Apply `patches` to `spec` and build the model.
///
/// Patches address the spec as the JSON document `{channels, parameters}`.
pub fn build(
    spec: &ModelSpec,
    patches: &[Patch],
    poi: &str,
    settings: &ModifierSettings,
) -> Result<HistFactoryModel> {
    if patches.is_empty() {
        return HistFactoryModel::from_spec(spec, poi, settings);
    }
    let doc = serde_json::to_value(spec)?;
    let patched = apply_patches(&doc, patches)?;
    let spec: ModelSpec = serde_json::from_value(patched)
        .map_err(|e| Error::Configuration(format!("patched model is invalid: {}", e)))?;
    HistFactoryModel::from_spec(&spec, poi, settings)
}

struct StatErrorAccum {
    sum_nominal: Vec<f64>,
    sum_sigma_sq: Vec<f64>,
}

impl HistFactoryModel {
    /// Build a model from a specification with `poi` as the parameter of interest.
    pub fn from_spec(spec: &ModelSpec, poi: &str, settings: &ModifierSettings) -> Result<Self> {
        let mut declared: Vec<_> = spec.channels.iter().collect();
        declared.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(w) = declared.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(Error::Configuration(format!("duplicate channel '{}'", w[0].name)));
        }
        if declared.is_empty() {
            return Err(Error::Configuration("model has no channels".to_string()));
        }

        let mut parameters: Vec<Parameter> = Vec::new();
        let mut param_sets: HashMap<String, ParamSet> = HashMap::new();
        let mut staterror: HashMap<String, StatErrorAccum> = HashMap::new();
        let mut channels = Vec::with_capacity(declared.len());

        for ch in declared {
            let n_bins = ch.samples.first().map(|s| s.data.len()).unwrap_or(0);
            if n_bins == 0 {
                return Err(Error::Configuration(format!("channel '{}' has no bins", ch.name)));
            }

            let mut samples = Vec::with_capacity(ch.samples.len());
            for s in &ch.samples {
                if s.data.len() != n_bins {
                    return Err(Error::Configuration(format!(
                        "channel '{}' sample '{}' has {} bins, expected {}",
                        ch.name,
                        s.name,
                        s.data.len(),
                        n_bins
                    )));
                }
                if let Some(v) = s.data.iter().find(|v| !v.is_finite()) {
                    return Err(Error::Configuration(format!(
                        "channel '{}' sample '{}' has non-finite yield {}",
                        ch.name, s.name, v
                    )));
                }

                let mut modifiers = Vec::with_capacity(s.modifiers.len());
                for m in &s.modifiers {
                    let kind = SetKind::of(m);
                    let len = if kind.per_bin() { n_bins } else { 1 };
                    let check_len = |got: usize, what: &str| -> Result<()> {
                        if got != n_bins {
                            return Err(Error::Configuration(format!(
                                "channel '{}' sample '{}' {} '{}' has {} entries, expected {}",
                                ch.name,
                                s.name,
                                what,
                                m.name(),
                                got,
                                n_bins
                            )));
                        }
                        Ok(())
                    };
                    match m {
                        Modifier::HistoSys { data, .. } => {
                            check_len(data.hi_data.len(), "histosys hi_data")?;
                            check_len(data.lo_data.len(), "histosys lo_data")?;
                        }
                        Modifier::ShapeSys { data, .. } => check_len(data.len(), "shapesys")?,
                        Modifier::StatError { data, .. } => check_len(data.len(), "staterror")?,
                        _ => {}
                    }

                    let (first, is_new) =
                        register(&mut param_sets, &mut parameters, m, kind, len)?;

                    match m {
                        Modifier::NormFactor { .. } | Modifier::Lumi { .. } => {
                            modifiers.push(ModelModifier::Scale { param_idx: first });
                        }
                        Modifier::NormSys { data, .. } => {
                            modifiers.push(ModelModifier::NormSys {
                                param_idx: first,
                                lo: data.lo,
                                hi: data.hi,
                            });
                        }
                        Modifier::HistoSys { data, .. } => {
                            modifiers.push(ModelModifier::HistoSys {
                                param_idx: first,
                                lo: data.lo_data.clone(),
                                hi: data.hi_data.clone(),
                            });
                        }
                        Modifier::ShapeSys { data, .. } => {
                            if is_new {
                                for (b, (sigma, nom)) in data.iter().zip(&s.data).enumerate() {
                                    let p = &mut parameters[first + b];
                                    if *sigma > 0.0 && *nom > 0.0 {
                                        p.constraint =
                                            Some(Constraint::Poisson { tau: (nom / sigma).powi(2) });
                                    } else {
                                        p.fixed = true;
                                    }
                                }
                            }
                            modifiers.push(ModelModifier::PerBin {
                                param_indices: (first..first + len).collect(),
                            });
                        }
                        Modifier::StatError { name, data } => {
                            let acc = staterror.entry(name.clone()).or_insert_with(|| {
                                StatErrorAccum {
                                    sum_nominal: vec![0.0; n_bins],
                                    sum_sigma_sq: vec![0.0; n_bins],
                                }
                            });
                            for (b, (sigma, nom)) in data.iter().zip(&s.data).enumerate() {
                                acc.sum_nominal[b] += nom;
                                acc.sum_sigma_sq[b] += sigma * sigma;
                            }
                            modifiers.push(ModelModifier::PerBin {
                                param_indices: (first..first + len).collect(),
                            });
                        }
                        Modifier::ShapeFactor { .. } => {
                            modifiers.push(ModelModifier::PerBin {
                                param_indices: (first..first + len).collect(),
                            });
                        }
                    }
                }

                samples.push(ModelSample { nominal: s.data.clone(), modifiers });
            }

            channels.push(ModelChannel { name: ch.name.clone(), n_bins, samples });
        }

        // Relative staterror widths over all samples sharing the set.
        for (name, acc) in &staterror {
            let set = &param_sets[name];
            for b in 0..set.len {
                let p = &mut parameters[set.first + b];
                let nom = acc.sum_nominal[b];
                if nom > 0.0 {
                    p.constraint =
                        Some(Constraint::Normal { center: 1.0, sigma: acc.sum_sigma_sq[b].sqrt() / nom });
                } else {
                    p.fixed = true;
                }
            }
        }

        let mut configured: HashMap<&str, &ParameterConfig> = HashMap::new();
        for cfg in &spec.parameters {
            match configured.get(cfg.name.as_str()) {
                Some(&first) if first == cfg => {
                    log::debug!("parameter '{}' configured twice with identical settings", cfg.name);
                }
                Some(_) => {
                    return Err(Error::Configuration(format!(
                        "parameter '{}' is configured more than once with different settings",
                        cfg.name
                    )));
                }
                None => {
                    configured.insert(cfg.name.as_str(), cfg);
                    apply_config(&param_sets, &mut parameters, cfg)?;
                }
            }
        }

        for p in &parameters {
            if let Some(Constraint::Normal { sigma, .. }) = p.constraint
                && !(sigma.is_finite() && sigma > 0.0)
            {
                return Err(match param_sets.get(&p.name) {
                    Some(set) if set.kind == SetKind::Lumi => Error::Configuration(format!(
                        "lumi parameter '{}' needs a positive sigma in the measurement config",
                        p.name
                    )),
                    _ => Error::Configuration(format!(
                        "parameter '{}' has invalid constraint width {}",
                        p.name, sigma
                    )),
                });
            }
        }

        let poi_set = param_sets.get(poi).ok_or_else(|| {
            Error::Configuration(format!("parameter of interest '{}' is not used by any modifier", poi))
        })?;
        if poi_set.len != 1 {
            return Err(Error::Configuration(format!(
                "parameter of interest '{}' must be a scalar parameter",
                poi
            )));
        }
        let poi_index = poi_set.first;

        let aux_params =
            parameters.iter().enumerate().filter(|(_, p)| p.constraint.is_some()).map(|(i, _)| i).collect();

        let model = Self { parameters, param_sets, poi_index, channels, aux_params, settings: *settings };
        log::debug!(
            "built model: {} channels, {} bins, {} parameters ({} constrained), poi '{}'",
            model.channels.len(),
            model.n_main(),
            model.parameters.len(),
            model.aux_params.len(),
            poi
        );
        Ok(model)
    }

    /// Number of parameters
    pub fn n_params(&self) -> usize {
        self.parameters.len()
    }

    /// Parameters in vector order
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Index of a parameter by name (`"mu"`, `"staterror_SR[1]"`, ...)
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        if let Some(set) = self.param_sets.get(name)
            && set.len == 1
            && !set.kind.per_bin()
        {
            return Some(set.first);
        }
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Index of the parameter of interest
    pub fn poi_index(&self) -> usize {
        self.poi_index
    }

    /// Name of the parameter of interest
    pub fn poi_name(&self) -> &str {
        &self.parameters[self.poi_index].name
    }

    /// Interpolation settings used for this build
    pub fn settings(&self) -> &ModifierSettings {
        &self.settings
    }

    /// Channel names in model order (lexicographic)
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Bin count per channel, in model order
    pub fn channel_bins(&self) -> Vec<usize> {
        self.channels.iter().map(|c| c.n_bins).collect()
    }

    /// Total number of main-measurement bins
    pub fn n_main(&self) -> usize {
        self.channels.iter().map(|c| c.n_bins).sum()
    }

    /// Number of auxiliary observations
    pub fn n_aux(&self) -> usize {
        self.aux_params.len()
    }

    /// Suggested initial values
    pub fn suggested_init(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.init).collect()
    }

    /// Suggested bounds; fixed parameters collapse to `(init, init)`
    pub fn suggested_bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| if p.fixed { (p.init, p.init) } else { p.bounds }).collect()
    }

    /// Which parameters are held fixed
    pub fn suggested_fixed(&self) -> Vec<bool> {
        self.parameters.iter().map(|p| p.fixed).collect()
    }

    /// Auxiliary observations of the nominal dataset, in parameter order.
    pub fn auxdata(&self) -> Vec<f64> {
        self.aux_params
            .iter()
            .filter_map(|&i| self.parameters[i].constraint.map(|c| c.auxdata()))
            .collect()
    }

    fn validate_params_len(&self, got: usize) -> Result<()> {
        if got != self.parameters.len() {
            return Err(Error::Validation(format!(
                "parameter length mismatch: expected {}, got {}",
                self.parameters.len(),
                got
            )));
        }
        Ok(())
    }

    fn validate_data(&self, data: &[f64]) -> Result<()> {
        let expected = self.n_main() + self.n_aux();
        if data.len() != expected {
            return Err(Error::Validation(format!(
                "data length mismatch: expected {} ({} main + {} aux), got {}",
                expected,
                self.n_main(),
                self.n_aux(),
                data.len()
            )));
        }
        if let Some((i, v)) = data.iter().enumerate().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            return Err(Error::Validation(format!("data[{}] = {} is not a valid count", i, v)));
        }
        Ok(())
    }

    /// Expected main-bin yields, generic over [`Scalar`].
    pub fn expected_main_generic<T: Scalar>(&self, params: &[T]) -> Result<Vec<T>> {
        self.validate_params_len(params.len())?;
        let normsys_code = self.settings.normsys.interpcode;
        let histosys_code = self.settings.histosys.interpcode;

        let mut out = Vec::with_capacity(self.n_main());
        for channel in &self.channels {
            let mut channel_expected = vec![T::from_f64(0.0); channel.n_bins];
            for sample in &channel.samples {
                let mut deltas = vec![T::from_f64(0.0); channel.n_bins];
                let mut factors = vec![T::from_f64(1.0); channel.n_bins];

                for modifier in &sample.modifiers {
                    match modifier {
                        ModelModifier::Scale { param_idx } => {
                            let k = params[*param_idx];
                            factors.iter_mut().for_each(|f| *f = *f * k);
                        }
                        ModelModifier::NormSys { param_idx, lo, hi } => {
                            let k = normsys_factor(normsys_code, params[*param_idx], *lo, *hi);
                            factors.iter_mut().for_each(|f| *f = *f * k);
                        }
                        ModelModifier::HistoSys { param_idx, lo, hi } => {
                            let alpha = params[*param_idx];
                            for (b, d) in deltas.iter_mut().enumerate() {
                                *d = *d
                                    + histosys_delta(histosys_code, alpha, sample.nominal[b], lo[b], hi[b]);
                            }
                        }
                        ModelModifier::PerBin { param_indices } => {
                            for (f, &idx) in factors.iter_mut().zip(param_indices) {
                                *f = *f * params[idx];
                            }
                        }
                    }
                }

                for (b, slot) in channel_expected.iter_mut().enumerate() {
                    *slot = *slot + (T::from_f64(sample.nominal[b]) + deltas[b]) * factors[b];
                }
            }
            out.extend(channel_expected);
        }
        Ok(out)
    }

    /// Expected data, generic over [`Scalar`]: main bins, then (optionally) the expected
    /// auxiliary observations of constrained parameters.
    pub fn expected_data_generic<T: Scalar>(&self, params: &[T], include_auxdata: bool) -> Result<Vec<T>> {
        let mut out = self.expected_main_generic(params)?;
        if include_auxdata {
            for &i in &self.aux_params {
                if let Some(c) = self.parameters[i].constraint {
                    out.push(c.expected(params[i]));
                }
            }
        }
        Ok(out)
    }

    /// Expected data at `params`.
    pub fn expected_data(&self, params: &[f64], include_auxdata: bool) -> Result<Vec<f64>> {
        self.expected_data_generic(params, include_auxdata)
    }

    /// Negative log-likelihood of `data` (main bins + auxdata), generic over [`Scalar`].
    ///
    /// With `strict`, expected counts outside the Poisson domain fail with
    /// [`Error::NumericDomain`]. Otherwise they are floored so that an optimizer
    /// can evaluate trial points beyond the physical region.
    pub fn nll_generic<T: Scalar>(&self, params: &[T], data: &[f64], strict: bool) -> Result<T> {
        let expected = self.expected_main_generic(params)?;
        let (main, aux) = data.split_at(expected.len().min(data.len()));
        if main.len() != expected.len() || aux.len() != self.aux_params.len() {
            return Err(Error::Validation(format!(
                "data length mismatch: expected {}, got {}",
                expected.len() + self.aux_params.len(),
                data.len()
            )));
        }

        let poisson_term = |n: f64, lam: T| -> Result<T> {
            if strict {
                poisson::nll(n, lam)
            } else {
                if lam.value() < SEARCH_FLOOR {
                    log::trace!("expected count {} floored at trial point", lam.value());
                }
                Ok(poisson::nll_unchecked(n, lam.floor_at(SEARCH_FLOOR)))
            }
        };

        let mut nll = T::from_f64(0.0);
        for (&n, &lam) in main.iter().zip(&expected) {
            nll = nll + poisson_term(n, lam)?;
        }

        for (&i, &a) in self.aux_params.iter().zip(aux) {
            match self.parameters[i].constraint {
                Some(Constraint::Normal { sigma, .. }) => {
                    nll = nll + normal::nll(a, params[i], sigma)?;
                }
                Some(c @ Constraint::Poisson { .. }) => {
                    nll = nll + poisson_term(a, c.expected(params[i]))?;
                }
                None => {}
            }
        }
        Ok(nll)
    }

    /// Negative log-likelihood of `data` at `params`.
    pub fn nll(&self, params: &[f64], data: &[f64]) -> Result<f64> {
        self.validate_data(data)?;
        let v = self.nll_generic(params, data, true)?;
        if !v.is_finite() {
            return Err(Error::NumericDomain(format!("negative log-likelihood is {}", v)));
        }
        Ok(v)
    }

    /// Log-likelihood of `data` at `params`.
    pub fn logpdf(&self, params: &[f64], data: &[f64]) -> Result<f64> {
        Ok(-self.nll(params, data)?)
    }

    /// `-2 ln L`
    pub fn twice_nll(&self, params: &[f64], data: &[f64]) -> Result<f64> {
        Ok(2.0 * self.nll(params, data)?)
    }

    /// Bind `data` to obtain an objective for the optimizer.
    pub fn likelihood(&self, data: &[f64]) -> Result<Likelihood<'_>> {
        self.validate_data(data)?;
        Ok(Likelihood { model: self, data: data.to_vec() })
    }
}

/// Register the parameter set of `m`, returning its first index and whether it is new.
fn register(
    sets: &mut HashMap<String, ParamSet>,
    parameters: &mut Vec<Parameter>,
    m: &Modifier,
    kind: SetKind,
    len: usize,
) -> Result<(usize, bool)> {
    let name = m.name();
    if let Some(set) = sets.get(name) {
        if set.kind != kind {
            return Err(Error::Configuration(format!(
                "parameter '{}' is used by both a {} and a {} modifier",
                name,
                set.declared_as,
                m.kind()
            )));
        }
        if set.len != len {
            return Err(Error::Configuration(format!(
                "{} '{}' spans {} bins here but {} bins elsewhere",
                m.kind(),
                name,
                len,
                set.len
            )));
        }
        return Ok((set.first, false));
    }

    let first = parameters.len();
    let scalar = |init: f64, bounds: (f64, f64), constraint: Option<Constraint>| Parameter {
        name: name.to_string(),
        init,
        bounds,
        fixed: false,
        constraint,
    };
    match kind {
        SetKind::NormFactor => parameters.push(scalar(1.0, (0.0, FACTOR_HI), None)),
        // Width comes from the measurement config.
        SetKind::Lumi => parameters
            .push(scalar(1.0, (0.0, FACTOR_HI), Some(Constraint::Normal { center: 1.0, sigma: 0.0 }))),
        SetKind::Alpha => {
            parameters.push(scalar(0.0, (-5.0, 5.0), Some(Constraint::Normal { center: 0.0, sigma: 1.0 })))
        }
        SetKind::ShapeSys | SetKind::StatError | SetKind::ShapeFactor => {
            let lo = if kind == SetKind::ShapeFactor { 0.0 } else { GAMMA_LO };
            for b in 0..len {
                parameters.push(Parameter {
                    name: format!("{}[{}]", name, b),
                    init: 1.0,
                    bounds: (lo, FACTOR_HI),
                    fixed: false,
                    constraint: None,
                });
            }
        }
    }
    sets.insert(name.to_string(), ParamSet { kind, declared_as: m.kind(), first, len });
    Ok((first, true))
}

/// Apply one measurement parameter entry to its parameter set.
fn apply_config(
    sets: &HashMap<String, ParamSet>,
    parameters: &mut [Parameter],
    cfg: &ParameterConfig,
) -> Result<()> {
    let Some(set) = sets.get(&cfg.name) else {
        log::warn!("measurement configures unknown parameter '{}', ignoring", cfg.name);
        return Ok(());
    };
    let check = |field: &str, got: usize| -> Result<()> {
        if got != 0 && got != set.len {
            return Err(Error::Configuration(format!(
                "parameter '{}' {} has {} entries, expected {}",
                cfg.name, field, got, set.len
            )));
        }
        Ok(())
    };
    check("inits", cfg.inits.len())?;
    check("bounds", cfg.bounds.len())?;
    check("auxdata", cfg.auxdata.len())?;
    check("sigmas", cfg.sigmas.len())?;

    for (k, p) in parameters[set.first..set.first + set.len].iter_mut().enumerate() {
        if let Some(&v) = cfg.inits.get(k) {
            p.init = v;
        }
        if let Some(&[lo, hi]) = cfg.bounds.get(k) {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(Error::Configuration(format!(
                    "parameter '{}' has invalid bounds [{}, {}]",
                    p.name, lo, hi
                )));
            }
            p.bounds = (lo, hi);
        }
        if cfg.fixed {
            p.fixed = true;
        }
        if !cfg.auxdata.is_empty() || !cfg.sigmas.is_empty() {
            match p.constraint.as_mut() {
                Some(Constraint::Normal { center, sigma }) => {
                    if let Some(&a) = cfg.auxdata.get(k) {
                        *center = a;
                    }
                    if let Some(&s) = cfg.sigmas.get(k) {
                        *sigma = s;
                    }
                }
                _ => {
                    return Err(Error::Configuration(format!(
                        "parameter '{}' has no Gaussian constraint; auxdata/sigmas do not apply",
                        p.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// A model with observed data bound: the objective minimised by fits.
#[derive(Debug, Clone)]
pub struct Likelihood<'a> {
    model: &'a HistFactoryModel,
    data: Vec<f64>,
}

impl<'a> Likelihood<'a> {
    /// Underlying model
    pub fn model(&self) -> &'a HistFactoryModel {
        self.model
    }

    /// Bound data (main bins + auxdata)
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl LogDensityModel for Likelihood<'_> {
    fn dim(&self) -> usize {
        self.model.n_params()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.model.parameters.iter().map(|p| p.name.clone()).collect()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        self.model.suggested_bounds()
    }

    fn parameter_init(&self) -> Vec<f64> {
        self.model.suggested_init()
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        self.model.nll(params, &self.data)
    }

    fn search_nll(&self, params: &[f64]) -> Result<f64> {
        self.model.nll_generic(params, &self.data, false)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        gradient(params, |p| self.model.nll_generic(p, &self.data, false))
    }
}

impl PoiModel for Likelihood<'_> {
    fn poi_index(&self) -> Option<usize> {
        Some(self.model.poi_index)
    }
}
