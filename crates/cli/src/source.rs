use std::path::Path;

use anyhow::{bail, Context, Result};
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use rbg_core::{RoleBasedGroup, GROUP_NAME_LABEL, ROLE_NAME_LABEL, ROLE_REVISION_ANNOTATION};
use rbg_revision::{Fingerprint, LastApplied};
use tracing::{debug, info, warn};

const DEFAULT_MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

fn max_manifest_bytes() -> u64 {
    std::env::var("RBG_MAX_MANIFEST_BYTES")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_MAX_MANIFEST_BYTES)
}

fn read_capped(path: &Path) -> Result<Vec<u8>> {
    let cap = max_manifest_bytes();
    let len = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?.len();
    if len > cap {
        bail!("{} is {} bytes; limit is {} (RBG_MAX_MANIFEST_BYTES)", path.display(), len, cap);
    }
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// Reads a RoleBasedGroup manifest (YAML or JSON) from disk.
pub fn load_group_file(path: &Path) -> Result<RoleBasedGroup> {
    let raw = read_capped(path)?;
    let group: RoleBasedGroup =
        serde_yaml::from_slice(&raw).with_context(|| format!("parsing RoleBasedGroup from {}", path.display()))?;
    debug!(path = %path.display(), roles = group.spec.roles.len(), templates = group.spec.role_templates.len(), "loaded group");
    Ok(group)
}

/// Reads a `{ role: fingerprint }` JSON map of last applied revisions.
pub fn load_last_applied_file(path: &Path) -> Result<LastApplied> {
    let raw = read_capped(path)?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing last-applied map from {}", path.display()))
}

fn group_api(client: Client, ns: Option<&str>) -> Api<RoleBasedGroup> {
    match ns {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::default_namespaced(client),
    }
}

fn sts_api(client: Client, ns: Option<&str>) -> Api<StatefulSet> {
    match ns {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::default_namespaced(client),
    }
}

pub async fn fetch_group(client: Client, name: &str, ns: Option<&str>) -> Result<RoleBasedGroup> {
    let group = group_api(client, ns)
        .get(name)
        .await
        .with_context(|| format!("getting rolebasedgroup {}", name))?;
    info!(group = %name, ns = ?group.namespace(), "fetched group");
    Ok(group)
}

/// Revisions recorded on the group's StatefulSets. Workloads without a
/// role label or revision annotation are skipped.
pub async fn fetch_last_applied(client: Client, group: &str, ns: Option<&str>) -> Result<LastApplied> {
    let lp = ListParams::default().labels(&format!("{}={}", GROUP_NAME_LABEL, group));
    let list = sts_api(client, ns)
        .list(&lp)
        .await
        .with_context(|| format!("listing statefulsets of {}", group))?;
    let mut out = LastApplied::new();
    for sts in list.items {
        let role = sts.labels().get(ROLE_NAME_LABEL).cloned();
        let rev = sts.annotations().get(ROLE_REVISION_ANNOTATION).cloned();
        match (role, rev) {
            (Some(role), Some(rev)) => {
                out.insert(role, Fingerprint::from(rev));
            }
            _ => warn!(statefulset = %sts.name_any(), "no role label or revision annotation; skipping"),
        }
    }
    debug!(group = %group, recorded = out.len(), "last applied revisions");
    Ok(out)
}
