#![forbid(unsafe_code)]

use k8s_openapi::api::core::v1::PodTemplateSpec;
use rbg_patch::{merge_patch, PatchError};
use serde_json::json;

fn base() -> PodTemplateSpec {
    serde_json::from_value(json!({
        "metadata": { "labels": { "app": "nginx" } },
        "spec": {
            "containers": [
                {
                    "name": "nginx",
                    "image": "registry.example.com/k8s/nginx:latest",
                    "resources": { "requests": { "cpu": "100m", "memory": "128Mi" } },
                    "env": [ { "name": "MODE", "value": "base" } ]
                }
            ],
            "volumes": [ { "name": "cache", "emptyDir": {} } ]
        }
    }))
    .unwrap()
}

fn requests(t: &PodTemplateSpec, container: usize) -> Vec<(String, String)> {
    let c = &t.spec.as_ref().unwrap().containers[container];
    c.resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .map(|m| m.iter().map(|(k, q)| (k.clone(), q.0.clone())).collect())
        .unwrap_or_default()
}

#[test]
fn empty_patch_is_identity() {
    let b = base();
    assert_eq!(merge_patch(&b, &json!({})).unwrap(), b);
    // a patch that only restates nothing under spec is also a no-op
    assert_eq!(merge_patch(&b, &json!({ "spec": {} })).unwrap(), b);
}

#[test]
fn container_patch_keeps_image_and_overrides_cpu() {
    let b = base();
    let patch = json!({ "spec": { "containers": [ { "name": "nginx", "resources": { "requests": { "cpu": "200m" } } } ] } });
    let out = merge_patch(&b, &patch).unwrap();
    let spec = out.spec.as_ref().unwrap();
    assert_eq!(spec.containers.len(), 1);
    assert_eq!(spec.containers[0].name, "nginx");
    assert_eq!(spec.containers[0].image.as_deref(), Some("registry.example.com/k8s/nginx:latest"));
    assert_eq!(
        requests(&out, 0),
        vec![("cpu".to_string(), "200m".to_string()), ("memory".to_string(), "128Mi".to_string())]
    );
    // base is untouched
    assert_eq!(requests(&b, 0)[0].1, "100m");
}

#[test]
fn two_roles_customize_the_same_base_independently() {
    let b = base();
    let role1 = merge_patch(
        &b,
        &json!({ "spec": { "containers": [ { "name": "nginx", "resources": { "requests": { "cpu": "200m" } } } ] } }),
    )
    .unwrap();
    let role2 = merge_patch(
        &b,
        &json!({ "spec": { "containers": [ { "name": "nginx", "resources": { "requests": { "cpu": "150m", "memory": "256Mi" } } } ] } }),
    )
    .unwrap();
    assert_eq!(requests(&role1, 0)[0], ("cpu".to_string(), "200m".to_string()));
    assert_eq!(
        requests(&role2, 0),
        vec![("cpu".to_string(), "150m".to_string()), ("memory".to_string(), "256Mi".to_string())]
    );
}

#[test]
fn new_container_is_appended_after_base_containers() {
    let out = merge_patch(
        &base(),
        &json!({ "spec": { "containers": [ { "name": "metrics", "image": "exporter:1" } ] } }),
    )
    .unwrap();
    let names: Vec<_> = out.spec.unwrap().containers.into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["nginx", "metrics"]);
}

#[test]
fn env_and_volumes_merge_by_name() {
    let out = merge_patch(
        &base(),
        &json!({ "spec": {
            "containers": [ { "name": "nginx", "env": [ { "name": "EXTRA", "value": "1" } ] } ],
            "volumes": [ { "name": "models", "emptyDir": {} } ]
        } }),
    )
    .unwrap();
    let spec = out.spec.unwrap();
    let env: Vec<_> = spec.containers[0].env.as_ref().unwrap().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(env, vec!["MODE", "EXTRA"]);
    let vols: Vec<_> = spec.volumes.as_ref().unwrap().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(vols, vec!["cache", "models"]);
}

#[test]
fn labels_merge_and_null_deletes() {
    let out = merge_patch(&base(), &json!({ "metadata": { "labels": { "app": null, "tier": "prefill" } } })).unwrap();
    let labels = out.metadata.unwrap().labels.unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels["tier"], "prefill");
}

#[test]
fn list_where_base_has_object_is_a_type_mismatch() {
    let err = merge_patch(&base(), &json!({ "spec": { "containers": [ { "name": "nginx", "resources": [] } ] } })).unwrap_err();
    assert!(matches!(err, PatchError::TypeMismatch { ref path, .. } if path == "spec.containers[name=nginx].resources"));
}

#[test]
fn numeric_quantities_in_patch_are_accepted() {
    let patch = json!({ "spec": {
        "containers": [ { "name": "nginx", "resources": { "limits": { "nvidia.com/gpu": 1 }, "requests": { "cpu": 2 } } } ],
        "volumes": [ { "name": "cache", "emptyDir": { "sizeLimit": 1073741824 } } ]
    } });
    let out = merge_patch(&base(), &patch).unwrap();
    let c = &out.spec.as_ref().unwrap().containers[0];
    let limits = c.resources.as_ref().unwrap().limits.as_ref().unwrap();
    assert_eq!(limits["nvidia.com/gpu"].0, "1");
    let mut got = requests(&out, 0);
    got.sort();
    assert_eq!(got, vec![("cpu".to_string(), "2".to_string()), ("memory".to_string(), "128Mi".to_string())]);
    let vol = &out.spec.as_ref().unwrap().volumes.as_ref().unwrap()[0];
    assert_eq!(vol.empty_dir.as_ref().unwrap().size_limit.as_ref().unwrap().0, "1073741824");
}
