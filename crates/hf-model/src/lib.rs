//! # hf-model
//!
//! HistFactory workspaces and models:
//!
//! - [`schema`]: the workspace JSON document
//! - [`patch`]: RFC 6902 patches and HEPData PatchSets
//! - [`interp`]: interpolation codes for systematic variations
//! - [`model`]: compiled model, expected data and likelihood
//! - [`workspace`]: model and data derivation from a workspace
//! - [`simplemodels`]: ready-made single-channel workspaces

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod interp;
pub mod model;
pub mod patch;
pub mod schema;
pub mod simplemodels;
pub mod workspace;

pub use interp::{InterpCode, ModifierSettings};
pub use model::{Constraint, HistFactoryModel, Likelihood, Parameter, build};
pub use patch::{Patch, PatchSet, apply_patches, parse_patch};
pub use schema::{ModelSpec, Workspace};
