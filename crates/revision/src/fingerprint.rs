use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use rbg_core::{RoleBasedGroupSpec, RoleSpec, WorkloadSpec};
use serde::{Deserialize, Serialize};

use crate::canonical::domain_hash_hex;

const ROLE_REVISION_DOMAIN: &str = "rbg.role-revision.v1";
const GROUP_REVISION_DOMAIN: &str = "rbg.group-revision.v1";
const SHORT_LEN: usize = 10;

/// Content hash of a role's resolved template and rollout metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str { &self.0 }

    /// Prefix used in revision names and human output.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Role fields other than the template whose change must roll pods.
/// Replica count is not part of it.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutMetadata<'a> {
    pub workload: &'a WorkloadSpec,
    pub labels: &'a BTreeMap<String, String>,
    pub annotations: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a RoleSpec> for RolloutMetadata<'a> {
    fn from(role: &'a RoleSpec) -> Self {
        Self { workload: &role.workload, labels: &role.labels, annotations: &role.annotations }
    }
}

#[derive(Serialize)]
struct RoleRevisionInput<'a> {
    template: &'a PodTemplateSpec,
    metadata: RolloutMetadata<'a>,
}

pub fn compute_fingerprint(
    resolved: &PodTemplateSpec,
    metadata: RolloutMetadata<'_>,
) -> Result<Fingerprint, serde_json::Error> {
    let input = RoleRevisionInput { template: resolved, metadata };
    domain_hash_hex(ROLE_REVISION_DOMAIN, &input).map(Fingerprint)
}

/// Revision of the whole group spec, role templates included. Replica
/// counts are stripped so scaling a role leaves it unchanged.
pub fn group_revision(spec: &RoleBasedGroupSpec) -> Result<Fingerprint, serde_json::Error> {
    let mut v = serde_json::to_value(spec)?;
    if let Some(roles) = v.get_mut("roles").and_then(|r| r.as_array_mut()) {
        for role in roles.iter_mut() {
            if let Some(obj) = role.as_object_mut() {
                obj.remove("replicas");
            }
        }
    }
    domain_hash_hex(GROUP_REVISION_DOMAIN, &v).map(Fingerprint)
}
