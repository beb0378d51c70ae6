use serde_json::Value;

use crate::keys::CONTAINER_LISTS;

/// Rewrites JSON numbers at `Quantity` locations of a pod template as
/// strings, so `nvidia.com/gpu: 1` decodes the way the API server accepts it.
pub(crate) fn stringify_quantities(template: &mut Value) {
    let Some(spec) = template.get_mut("spec") else { return };
    for list in CONTAINER_LISTS {
        if let Some(containers) = spec.get_mut(list).and_then(Value::as_array_mut) {
            for c in containers.iter_mut() {
                if let Some(res) = c.get_mut("resources") {
                    stringify_requirements(res);
                }
            }
        }
    }
    if let Some(overhead) = spec.get_mut("overhead") {
        stringify_values(overhead);
    }
    if let Some(volumes) = spec.get_mut("volumes").and_then(Value::as_array_mut) {
        for v in volumes.iter_mut() {
            if let Some(limit) = v.get_mut("emptyDir").and_then(|e| e.get_mut("sizeLimit")) {
                stringify(limit);
            }
            let claim = v
                .get_mut("ephemeral")
                .and_then(|e| e.get_mut("volumeClaimTemplate"))
                .and_then(|t| t.get_mut("spec"))
                .and_then(|s| s.get_mut("resources"));
            if let Some(res) = claim {
                stringify_requirements(res);
            }
        }
    }
}

fn stringify_requirements(res: &mut Value) {
    for field in ["limits", "requests"] {
        if let Some(map) = res.get_mut(field) {
            stringify_values(map);
        }
    }
}

fn stringify_values(map: &mut Value) {
    if let Some(m) = map.as_object_mut() {
        for v in m.values_mut() {
            stringify(v);
        }
    }
}

fn stringify(v: &mut Value) {
    if let Value::Number(n) = v {
        *v = Value::String(n.to_string());
    }
}
