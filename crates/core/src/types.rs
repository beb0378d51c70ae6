use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A set of named roles rendered into workloads, optionally sharing pod
/// templates declared once under `roleTemplates`.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workloads.x-k8s.io",
    version = "v1alpha1",
    kind = "RoleBasedGroup",
    plural = "rolebasedgroups",
    shortname = "rbg",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RoleBasedGroupSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_templates: Vec<RoleTemplate>,
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
}

/// A reusable pod template. Names are DNS labels, unique within the group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplate {
    pub name: String,
    #[serde(default)]
    pub template: PodTemplateSpec,
}

impl RoleTemplate {
    pub fn new(name: impl Into<String>, template: PodTemplateSpec) -> Self {
        Self { name: name.into(), template }
    }

    pub fn container_count(&self) -> usize {
        self.template.spec.as_ref().map_or(0, |s| s.containers.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateRef {
    pub name: String,
}

/// Kind of workload a role is rendered into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub api_version: String,
    pub kind: String,
}

impl WorkloadSpec {
    pub fn stateful_set() -> Self {
        Self { api_version: "apps/v1".into(), kind: "StatefulSet".into() }
    }

    pub fn is_stateful_set(&self) -> bool {
        self.api_version == "apps/v1" && self.kind == "StatefulSet"
    }
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self::stateful_set()
    }
}

/// One workload slot of a group.
///
/// A role either carries its own `template` (direct mode) or names a shared
/// template through `templateRef` and customizes it with `templatePatch`
/// (reference mode). When `templateRef` is set, an inline `template` is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<TemplateRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub template_patch: Option<serde_json::Value>,
    #[serde(default)]
    pub workload: WorkloadSpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Where a role's pod template comes from, with reference mode taking priority.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateSource<'a> {
    Direct(Option<&'a PodTemplateSpec>),
    Reference { template_ref: &'a str, patch: Option<&'a serde_json::Value> },
}

impl RoleSpec {
    pub fn with_template(name: impl Into<String>, template: PodTemplateSpec) -> Self {
        Self { name: name.into(), template: Some(template), ..Default::default() }
    }

    pub fn with_template_ref(name: impl Into<String>, template_ref: impl Into<String>, patch: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            template_ref: Some(TemplateRef { name: template_ref.into() }),
            template_patch: Some(patch),
            ..Default::default()
        }
    }

    pub fn template_source(&self) -> TemplateSource<'_> {
        match &self.template_ref {
            Some(r) => TemplateSource::Reference { template_ref: &r.name, patch: self.template_patch.as_ref() },
            None => TemplateSource::Direct(self.template.as_ref()),
        }
    }

    pub fn replicas_or_default(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }
}

fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    use schemars::schema::{InstanceType, Schema, SchemaObject};
    let mut obj = SchemaObject { instance_type: Some(InstanceType::Object.into()), ..Default::default() };
    obj.extensions.insert("x-kubernetes-preserve-unknown-fields".into(), serde_json::Value::Bool(true));
    Schema::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_camel_case() {
        let yaml = serde_json::json!({
            "apiVersion": "workloads.x-k8s.io/v1alpha1",
            "kind": "RoleBasedGroup",
            "metadata": { "name": "demo", "namespace": "ns" },
            "spec": {
                "roleTemplates": [
                    { "name": "base", "template": { "spec": { "containers": [ { "name": "app", "image": "nginx" } ] } } }
                ],
                "roles": [
                    { "name": "prefill", "replicas": 2, "templateRef": { "name": "base" }, "templatePatch": {} },
                    { "name": "decode", "template": { "spec": { "containers": [ { "name": "app" } ] } } }
                ]
            }
        });
        let rbg: RoleBasedGroup = serde_json::from_value(yaml).unwrap();
        assert_eq!(rbg.spec.role_templates[0].container_count(), 1);
        let prefill = &rbg.spec.roles[0];
        assert_eq!(prefill.replicas_or_default(), 2);
        assert!(prefill.workload.is_stateful_set());
        assert!(matches!(
            prefill.template_source(),
            TemplateSource::Reference { template_ref: "base", patch: Some(_) }
        ));
        assert!(matches!(rbg.spec.roles[1].template_source(), TemplateSource::Direct(Some(_))));
        assert_eq!(rbg.spec.roles[1].replicas_or_default(), 1);
    }

    #[test]
    fn reference_mode_shadows_inline_template() {
        let mut role = RoleSpec::with_template_ref("prefill", "base", serde_json::json!({}));
        role.template = Some(PodTemplateSpec::default());
        assert!(matches!(role.template_source(), TemplateSource::Reference { .. }));
    }
}
