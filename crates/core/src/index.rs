use std::collections::BTreeMap;

use crate::{RoleBasedGroupSpec, RoleSpec, RoleTemplate};

/// Read-only name lookup over a group's role templates, built per pass.
///
/// When names collide the first declaration wins; validation rejects such
/// groups before resolution, so this only matters for unvalidated input.
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex<'a> {
    by_name: BTreeMap<&'a str, &'a RoleTemplate>,
}

impl<'a> TemplateIndex<'a> {
    pub fn new(spec: &'a RoleBasedGroupSpec) -> Self {
        let mut by_name = BTreeMap::new();
        for t in spec.role_templates.iter() {
            by_name.entry(t.name.as_str()).or_insert(t);
        }
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&'a RoleTemplate> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize { self.by_name.len() }
    pub fn is_empty(&self) -> bool { self.by_name.is_empty() }
}

impl RoleBasedGroupSpec {
    /// Roles whose `templateRef` names `template`, in declaration order.
    pub fn roles_referencing<'a>(&'a self, template: &'a str) -> impl Iterator<Item = &'a RoleSpec> + 'a {
        self.roles
            .iter()
            .filter(move |r| r.template_ref.as_ref().is_some_and(|t| t.name == template))
    }
}
