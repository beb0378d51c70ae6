#![forbid(unsafe_code)]

use k8s_openapi::api::core::v1::PodTemplateSpec;
use rbg_core::{validate_group, RoleBasedGroupSpec, RoleSpec, RoleTemplate};
use rbg_resolve::{resolve, ResolveError, Resolver};
use rbg_patch::PatchError;
use serde_json::json;

fn pod(image: &str) -> PodTemplateSpec {
    serde_json::from_value(json!({ "spec": { "containers": [ { "name": "app", "image": image } ] } })).unwrap()
}

#[test]
fn reference_wins_over_inline_template() {
    let mut role = RoleSpec::with_template_ref(
        "prefill",
        "base",
        json!({ "spec": { "containers": [ { "name": "app", "args": ["--prefill"] } ] } }),
    );
    role.template = Some(pod("inline:ignored"));
    let spec = RoleBasedGroupSpec { role_templates: vec![RoleTemplate::new("base", pod("nginx:1.19"))], roles: vec![role] };

    validate_group(&spec).unwrap();
    let resolved = resolve(&spec).remove("prefill").unwrap().unwrap();
    let c = &resolved.template.spec.as_ref().unwrap().containers;
    assert_eq!(c.len(), 1);
    assert_eq!(c[0].image.as_deref(), Some("nginx:1.19"));
    assert_eq!(c[0].args.as_deref(), Some(&["--prefill".to_string()][..]));
    assert_ne!(Some(&resolved.template), spec.roles[0].template.as_ref());
}

#[test]
fn bad_patch_only_fails_its_own_role() {
    let spec = RoleBasedGroupSpec {
        role_templates: vec![RoleTemplate::new("base", pod("nginx"))],
        roles: vec![
            RoleSpec::with_template_ref("broken", "base", json!({ "spec": { "containers": { "name": "app" } } })),
            RoleSpec::with_template_ref("fine", "base", json!({ "metadata": { "labels": { "tier": "decode" } } })),
        ],
    };
    let resolver = Resolver::new(&spec);
    let out = resolver.resolve_all(&spec.roles);
    assert_eq!(out.len(), 2);
    match &out[0].1 {
        Err(ResolveError::Patch { role, template_ref, source: PatchError::TypeMismatch { path, .. } }) => {
            assert_eq!(role, "broken");
            assert_eq!(template_ref, "base");
            assert_eq!(path, "spec.containers");
        }
        other => panic!("unexpected {:?}", other),
    }
    let fine = out[1].1.as_ref().unwrap();
    assert_eq!(fine.template.metadata.as_ref().unwrap().labels.as_ref().unwrap()["tier"], "decode");
}

#[test]
fn resolving_twice_is_deterministic() {
    let spec = RoleBasedGroupSpec {
        role_templates: vec![RoleTemplate::new("base", pod("nginx"))],
        roles: vec![RoleSpec::with_template_ref(
            "a",
            "base",
            json!({ "spec": { "containers": [ { "name": "app", "env": [ { "name": "X", "value": "1" } ] } ] } }),
        )],
    };
    assert_eq!(resolve(&spec), resolve(&spec));
}
