//! StatefulSet rendering for resolved roles.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};
use rbg_core::{RoleBasedGroup, RoleSpec, GROUP_NAME_LABEL, ROLE_NAME_LABEL, ROLE_REVISION_ANNOTATION};
use rbg_revision::{Fingerprint, GroupPlan};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("role {role:?}: workload {api_version}/{kind} is not supported")]
    UnsupportedWorkload { role: String, api_version: String, kind: String },
    #[error("group has no metadata.name")]
    MissingGroupName,
}

/// Name of the workload rendered for `role`: `{group}-{role}`.
pub fn workload_name(group: &str, role: &str) -> String {
    format!("{}-{}", group, role)
}

pub fn selector_labels(group: &str, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (GROUP_NAME_LABEL.to_string(), group.to_string()),
        (ROLE_NAME_LABEL.to_string(), role.to_string()),
    ])
}

/// Builds the desired StatefulSet for one role from its resolved template.
///
/// Role labels and annotations are layered onto the pod template; selector
/// labels override role labels with the same key.
pub fn render_statefulset(
    group: &RoleBasedGroup,
    role: &RoleSpec,
    template: &PodTemplateSpec,
    fingerprint: &Fingerprint,
) -> Result<StatefulSet, RenderError> {
    if !role.workload.is_stateful_set() {
        return Err(RenderError::UnsupportedWorkload {
            role: role.name.clone(),
            api_version: role.workload.api_version.clone(),
            kind: role.workload.kind.clone(),
        });
    }
    let group_name = group.metadata.name.as_deref().ok_or(RenderError::MissingGroupName)?;
    let selector = selector_labels(group_name, &role.name);

    let mut pod = template.clone();
    let meta = pod.metadata.get_or_insert_with(ObjectMeta::default);
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    labels.extend(role.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    labels.extend(selector.clone());
    if !role.annotations.is_empty() {
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(role.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let name = workload_name(group_name, &role.name);
    debug!(workload = %name, fingerprint = %fingerprint.short(), "rendered statefulset");
    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: group.namespace(),
            labels: Some(selector.clone()),
            annotations: Some(BTreeMap::from([(ROLE_REVISION_ANNOTATION.to_string(), fingerprint.to_string())])),
            owner_references: group.controller_owner_ref(&()).map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(role.replicas_or_default()),
            selector: LabelSelector { match_labels: Some(selector), ..Default::default() },
            template: pod,
            ..Default::default()
        }),
        status: None,
    })
}

/// Renders every role of `plan` that resolved, in role order. Roles that
/// failed to resolve are skipped; their error stays in the plan.
pub fn render_group(group: &RoleBasedGroup, plan: &GroupPlan) -> Vec<(String, Result<StatefulSet, RenderError>)> {
    let roles: BTreeMap<&str, &RoleSpec> = group.spec.roles.iter().map(|r| (r.name.as_str(), r)).collect();
    plan.roles
        .iter()
        .filter_map(|rp| {
            let rev = rp.outcome.as_ref().ok()?;
            let role = roles.get(rp.role.as_str())?;
            Some((rp.role.clone(), render_statefulset(group, role, &rev.resolved.template, &rev.fingerprint)))
        })
        .collect()
}
