//! Patches and PatchSets.
//!
//! A patch is a list of RFC 6902 JSON Patch operations (`add`, `remove`, `replace`,
//! `move`, `copy`, `test`). Patches derive new documents: the input is cloned and
//! never mutated, and a patch whose path does not resolve fails as a whole.
//!
//! A PatchSet (the HEPData layout) bundles many named signal patches for one
//! background-only workspace.

use hf_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One RFC 6902 patch.
pub type Patch = json_patch::Patch;

/// Parse a patch from JSON text (an array of operations).
pub fn parse_patch(json: &str) -> Result<Patch> {
    let value: Value = serde_json::from_str(json)?;
    patch_from_value(value)
}

/// Parse a patch from a JSON value.
pub fn patch_from_value(value: Value) -> Result<Patch> {
    serde_json::from_value(value).map_err(|e| Error::Patch(format!("malformed patch: {}", e)))
}

/// Apply `patches` in order to a copy of `doc`.
pub fn apply_patches(doc: &Value, patches: &[Patch]) -> Result<Value> {
    let mut out = doc.clone();
    for (i, p) in patches.iter().enumerate() {
        json_patch::patch(&mut out, p)
            .map_err(|e| Error::Patch(format!("patch #{} failed: {}", i, e)))?;
        log::debug!("applied patch #{} ({} operations)", i, p.0.len());
    }
    Ok(out)
}

/// A collection of named patches for one background-only workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSet {
    /// Free-form metadata (`description`, `digests`, `labels`, ...).
    #[serde(default)]
    pub metadata: Value,
    /// Patch entries.
    pub patches: Vec<PatchEntry>,
    /// Schema version.
    #[serde(default)]
    pub version: Option<String>,
}

/// One named patch inside a PatchSet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchEntry {
    /// Name and signal-point values.
    pub metadata: PatchMetadata,
    /// Operations.
    pub patch: Patch,
}

/// Patch metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchMetadata {
    /// Patch name, e.g. `sbottom_1300_205_60`.
    pub name: String,
    /// Values of the signal-point labels (HEPData stores a heterogeneous list).
    #[serde(default)]
    pub values: Vec<Value>,
}

impl PatchSet {
    /// Parse a PatchSet from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        serde_json::from_value(value).map_err(|e| Error::Patch(format!("malformed patchset: {}", e)))
    }

    /// Patch names in document order.
    pub fn patch_names(&self) -> Vec<&str> {
        self.patches.iter().map(|p| p.metadata.name.as_str()).collect()
    }

    /// Signal-point labels from the metadata, if present.
    pub fn labels(&self) -> Vec<&str> {
        self.metadata
            .get("labels")
            .and_then(Value::as_array)
            .map(|l| l.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Look up a patch by name.
    pub fn patch_by_name(&self, name: &str) -> Result<&Patch> {
        self.patches.iter().find(|p| p.metadata.name == name).map(|p| &p.patch).ok_or_else(|| {
            let mut names = self.patch_names();
            names.sort();
            Error::Patch(format!("unknown patch '{}'. Available: {}", name, names.join(", ")))
        })
    }

    /// Look up a patch by its signal-point values.
    pub fn patch_by_values(&self, values: &[Value]) -> Result<&Patch> {
        self.patches
            .iter()
            .find(|p| p.metadata.values.as_slice() == values)
            .map(|p| &p.patch)
            .ok_or_else(|| Error::Patch(format!("no patch with values {:?}", values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({"channels": [{"name": "c", "samples": [{"name": "b", "data": [1.0], "modifiers": []}]}]})
    }

    #[test]
    fn test_add_remove_replace() {
        let p = patch_from_value(json!([
            {"op": "add", "path": "/channels/0/samples/-", "value": {"name": "s", "data": [2.0], "modifiers": []}},
            {"op": "replace", "path": "/channels/0/samples/0/data/0", "value": 3.0},
            {"op": "remove", "path": "/channels/0/samples/0/modifiers"}
        ]))
        .unwrap();
        let out = apply_patches(&base(), &[p]).unwrap();
        assert_eq!(out["channels"][0]["samples"][1]["name"], "s");
        assert_eq!(out["channels"][0]["samples"][0]["data"][0], 3.0);
        assert!(out["channels"][0]["samples"][0].get("modifiers").is_none());
    }

    #[test]
    fn test_input_document_is_not_mutated() {
        let doc = base();
        let p = patch_from_value(json!([{"op": "replace", "path": "/channels/0/name", "value": "d"}])).unwrap();
        let out = apply_patches(&doc, &[p]).unwrap();
        assert_eq!(doc, base());
        assert_eq!(out["channels"][0]["name"], "d");
    }

    #[test]
    fn test_move_copy_and_escapes() {
        let doc = json!({"a/b": {"x": 1}, "m~n": [1, 2]});
        let p = patch_from_value(json!([
            {"op": "copy", "from": "/a~1b/x", "path": "/y"},
            {"op": "move", "from": "/m~0n/1", "path": "/m~0n/0"},
            {"op": "test", "path": "/y", "value": 1}
        ]))
        .unwrap();
        let out = apply_patches(&doc, &[p]).unwrap();
        assert_eq!(out, json!({"a/b": {"x": 1}, "m~n": [2, 1], "y": 1}));
    }

    #[test]
    fn test_unresolved_path_is_patch_error() {
        let p = patch_from_value(json!([{"op": "remove", "path": "/channels/3"}])).unwrap();
        assert!(matches!(apply_patches(&base(), &[p]), Err(Error::Patch(_))));

        let p = patch_from_value(json!([{"op": "add", "path": "/nope/child", "value": 1}])).unwrap();
        assert!(matches!(apply_patches(&base(), &[p]), Err(Error::Patch(_))));

        let p = patch_from_value(json!([{"op": "test", "path": "/channels/0/name", "value": "x"}])).unwrap();
        assert!(matches!(apply_patches(&base(), &[p]), Err(Error::Patch(_))));

        assert!(matches!(patch_from_value(json!([{"op": "frobnicate", "path": ""}])), Err(Error::Patch(_))));
    }

    #[test]
    fn test_patches_apply_in_order() {
        let first = patch_from_value(json!([{"op": "add", "path": "/k", "value": 1}])).unwrap();
        let second = patch_from_value(json!([{"op": "replace", "path": "/k", "value": 2}])).unwrap();
        let out = apply_patches(&json!({}), &[first.clone(), second.clone()]).unwrap();
        assert_eq!(out["k"], 2);
        assert!(apply_patches(&json!({}), &[second, first]).is_err());
    }

    #[test]
    fn test_patchset_lookup() {
        let ps = PatchSet::from_json_str(
            &json!({
                "metadata": {"name": "demo", "labels": ["m1", "m2"], "digests": {}, "description": "test"},
                "version": "1.0.0",
                "patches": [
                    {"metadata": {"name": "p_100_10", "values": [100, 10]},
                     "patch": [{"op": "add", "path": "/k", "value": "a"}]},
                    {"metadata": {"name": "p_200_10", "values": [200, 10]},
                     "patch": [{"op": "add", "path": "/k", "value": "b"}]}
                ]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(ps.patch_names(), vec!["p_100_10", "p_200_10"]);
        assert_eq!(ps.labels(), vec!["m1", "m2"]);

        let by_name = ps.patch_by_name("p_200_10").unwrap();
        assert_eq!(apply_patches(&json!({}), &[by_name.clone()]).unwrap()["k"], "b");

        let by_values = ps.patch_by_values(&[json!(100), json!(10)]).unwrap();
        assert_eq!(apply_patches(&json!({}), &[by_values.clone()]).unwrap()["k"], "a");

        assert!(matches!(ps.patch_by_name("missing"), Err(Error::Patch(_))));
        assert!(matches!(ps.patch_by_values(&[json!(1)]), Err(Error::Patch(_))));
    }
}
