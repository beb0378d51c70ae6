use std::fmt;

/// Lists whose entries are merged by an identity field instead of replaced.
///
/// Paths are field names from the document root with list indices elided,
/// so `["spec", "containers", "env"]` covers the env list of every container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeKeys {
    entries: Vec<(Vec<String>, String)>,
}

pub(crate) const CONTAINER_LISTS: [&str; 3] = ["containers", "initContainers", "ephemeralContainers"];

impl MergeKeys {
    /// No keyed lists: every list in a patch replaces the base list.
    pub fn none() -> Self {
        Self::default()
    }

    /// The merge keys Kubernetes declares for a `PodTemplateSpec`.
    pub fn pod_template() -> Self {
        let mut keys = Self::none()
            .with(&["spec", "volumes"], "name")
            .with(&["spec", "imagePullSecrets"], "name")
            .with(&["spec", "hostAliases"], "ip")
            .with(&["spec", "resourceClaims"], "name")
            .with(&["spec", "schedulingGates"], "name");
        for list in CONTAINER_LISTS {
            keys = keys
                .with(&["spec", list], "name")
                .with(&["spec", list, "env"], "name")
                .with(&["spec", list, "ports"], "containerPort")
                .with(&["spec", list, "volumeMounts"], "mountPath")
                .with(&["spec", list, "volumeDevices"], "devicePath");
        }
        keys
    }

    pub fn with(mut self, path: &[&str], key: &str) -> Self {
        self.entries.push((path.iter().map(|s| s.to_string()).collect(), key.to_string()));
        self
    }

    pub(crate) fn key_for(&self, path: &Path<'_>) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p.iter().map(String::as_str).eq(path.field_names()))
            .map(|(_, k)| k.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Seg<'a> {
    Field(&'a str),
    Index(usize),
    /// Keyed list entry, rendered `[key=id]`.
    Keyed(String),
}

/// Location inside the document being merged, for key lookup and error messages.
///
/// Entries of keyed lists are named by their merge key, so a path points at
/// the same entry in base, patch and result. `Index` segments only appear
/// before an entry's key is known and then count patch entries.
#[derive(Debug, Clone, Default)]
pub(crate) struct Path<'a> {
    segs: Vec<Seg<'a>>,
}

impl<'a> Path<'a> {
    pub(crate) fn push_field(&mut self, name: &'a str) {
        self.segs.push(Seg::Field(name));
    }

    pub(crate) fn push_index(&mut self, i: usize) {
        self.segs.push(Seg::Index(i));
    }

    pub(crate) fn push_keyed(&mut self, key: &str, id: &serde_json::Value) {
        let id = match id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.segs.push(Seg::Keyed(format!("{}={}", key, id)));
    }

    pub(crate) fn pop(&mut self) {
        self.segs.pop();
    }

    pub(crate) fn field_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.segs.iter().filter_map(|s| match s {
            Seg::Field(f) => Some(*f),
            Seg::Index(_) | Seg::Keyed(_) => None,
        })
    }
}

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segs.is_empty() {
            return f.write_str("(root)");
        }
        for (i, seg) in self.segs.iter().enumerate() {
            match seg {
                Seg::Field(name) if i == 0 => f.write_str(name)?,
                Seg::Field(name) => write!(f, ".{}", name)?,
                Seg::Index(idx) => write!(f, "[{}]", idx)?,
                Seg::Keyed(id) => write!(f, "[{}]", id)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_list_indices() {
        let keys = MergeKeys::pod_template();
        let mut path = Path::default();
        path.push_field("spec");
        path.push_field("containers");
        assert_eq!(keys.key_for(&path), Some("name"));
        path.push_index(3);
        path.push_field("ports");
        assert_eq!(keys.key_for(&path), Some("containerPort"));
        assert_eq!(path.to_string(), "spec.containers[3].ports");
        path.pop();
        path.push_field("args");
        assert_eq!(keys.key_for(&path), None);
    }

    #[test]
    fn keyed_entries_render_by_merge_key() {
        let keys = MergeKeys::pod_template();
        let mut path = Path::default();
        path.push_field("spec");
        path.push_field("containers");
        path.push_keyed("name", &serde_json::json!("app"));
        path.push_field("ports");
        assert_eq!(keys.key_for(&path), Some("containerPort"));
        path.push_keyed("containerPort", &serde_json::json!(8080));
        assert_eq!(path.to_string(), "spec.containers[name=app].ports[containerPort=8080]");
    }

    #[test]
    fn root_path_renders_explicitly() {
        assert_eq!(Path::default().to_string(), "(root)");
    }
}
