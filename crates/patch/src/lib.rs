//! Strategic merge of a per-role patch onto a shared pod template.
//!
//! Objects merge field by field, `null` removes a field, and the lists named
//! in [`MergeKeys`] merge entry by entry on an identity field (containers by
//! `name`, for example) so a patch can touch one container without restating
//! the others. Any other list in a patch replaces the base list.

#![forbid(unsafe_code)]

mod keys;
mod merge;
mod quantity;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use serde_json::Value as Json;
use tracing::debug;

pub use keys::MergeKeys;

use keys::Path;
use merge::Merger;

/// Default upper bound on the number of nodes in a single patch document.
pub const DEFAULT_MAX_PATCH_NODES: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("invalid patch document: {0}")]
    InvalidPatchDocument(String),
    #[error("type mismatch at {path}: patch supplies {patch} where base has {base}")]
    TypeMismatch { path: String, base: &'static str, patch: &'static str },
    #[error("encoding base template: {0}")]
    EncodeBase(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub max_patch_nodes: usize,
    pub keys: MergeKeys,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { max_patch_nodes: DEFAULT_MAX_PATCH_NODES, keys: MergeKeys::pod_template() }
    }
}

impl MergeOptions {
    /// Defaults, with the node budget overridable through `RBG_MAX_PATCH_NODES`.
    pub fn from_env() -> Self {
        let max_patch_nodes = std::env::var("RBG_MAX_PATCH_NODES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_PATCH_NODES);
        Self { max_patch_nodes, ..Self::default() }
    }
}

fn node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur > max { return; }
        *cur += 1;
        match v {
            Json::Object(map) => {
                for vv in map.values() {
                    if *cur > max { break; }
                    walk(vv, cur, max);
                }
            }
            Json::Array(arr) => {
                for vv in arr.iter() {
                    if *cur > max { break; }
                    walk(vv, cur, max);
                }
            }
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count > max
}

/// Checks that a decoded patch is a JSON object within the node budget.
pub fn check_patch(patch: &Json, opts: &MergeOptions) -> Result<(), PatchError> {
    if !patch.is_object() {
        return Err(PatchError::InvalidPatchDocument("patch must be a JSON object".into()));
    }
    if node_budget_exceeded(patch, opts.max_patch_nodes) {
        return Err(PatchError::InvalidPatchDocument(format!(
            "patch too complex (>{} nodes)",
            opts.max_patch_nodes
        )));
    }
    Ok(())
}

/// Decodes a raw JSON patch as received on the wire and checks it against `opts`.
pub fn parse_patch(raw: &[u8], opts: &MergeOptions) -> Result<Json, PatchError> {
    let v: Json = serde_json::from_slice(raw).map_err(|e| PatchError::InvalidPatchDocument(e.to_string()))?;
    check_patch(&v, opts)?;
    Ok(v)
}

/// Merges `patch` onto an arbitrary JSON document using `opts.keys`.
pub fn merge_values(base: &Json, patch: &Json, opts: &MergeOptions) -> Result<Json, PatchError> {
    check_patch(patch, opts)?;
    Merger::new(&opts.keys).merge(base, patch, &mut Path::default())
}

/// Applies `patch` to `base` with default options. `base` is left untouched.
pub fn merge_patch(base: &PodTemplateSpec, patch: &Json) -> Result<PodTemplateSpec, PatchError> {
    merge_patch_with(base, patch, &MergeOptions::default())
}

pub fn merge_patch_with(base: &PodTemplateSpec, patch: &Json, opts: &MergeOptions) -> Result<PodTemplateSpec, PatchError> {
    check_patch(patch, opts)?;
    if patch.as_object().is_some_and(|m| m.is_empty()) {
        debug!("empty template patch; keeping base template");
        return Ok(base.clone());
    }
    let base_json = serde_json::to_value(base).map_err(|e| PatchError::EncodeBase(e.to_string()))?;
    let mut merged = Merger::new(&opts.keys).merge(&base_json, patch, &mut Path::default())?;
    quantity::stringify_quantities(&mut merged);
    serde_json::from_value(merged)
        .map_err(|e| PatchError::InvalidPatchDocument(format!("patched template is not a valid pod template: {}", e)))
}
