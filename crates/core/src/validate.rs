//! Shape and reference checks run before any template is resolved.
//!
//! Both passes stop at the first violation in declaration order.

use std::collections::BTreeSet;

use crate::{is_dns_label, RoleBasedGroupSpec, TemplateIndex, TemplateSource};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("spec.roleTemplates[{index}].name: {name:?} is not a valid DNS label")]
    InvalidName { index: usize, name: String },
    #[error("spec.roleTemplates[{index}].name: duplicate template name {name:?}")]
    DuplicateTemplateName { index: usize, name: String },
    #[error("spec.roleTemplates[{index}].template.spec.containers: template {name:?} must have at least one container")]
    EmptyContainerList { index: usize, name: String },
    #[error("spec.roles[{index}].templateRef.name: template {template_ref:?} of role {role:?} not found in spec.roleTemplates")]
    TemplateRefNotFound { index: usize, role: String, template_ref: String },
    #[error("spec.roles[{index}].templatePatch: required when templateRef is set (role {role:?})")]
    MissingTemplatePatch { index: usize, role: String },
    #[error("spec.roles[{index}].templatePatch: only valid when templateRef is set (role {role:?})")]
    PatchWithoutReference { index: usize, role: String },
    #[error("spec.roles[{index}].template: required when templateRef is not set (role {role:?})")]
    MissingTemplate { index: usize, role: String },
    #[error("spec.roles[{index}].name: duplicate role name {role:?}")]
    DuplicateRoleName { index: usize, role: String },
}

/// Checks every role template: DNS label name, unique name, at least one container.
pub fn validate_role_templates(spec: &RoleBasedGroupSpec) -> Result<(), ValidationError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for (index, t) in spec.role_templates.iter().enumerate() {
        if !is_dns_label(&t.name) {
            return Err(ValidationError::InvalidName { index, name: t.name.clone() });
        }
        if !seen.insert(t.name.as_str()) {
            return Err(ValidationError::DuplicateTemplateName { index, name: t.name.clone() });
        }
        if t.container_count() == 0 {
            return Err(ValidationError::EmptyContainerList { index, name: t.name.clone() });
        }
    }
    Ok(())
}

/// Checks that every role resolves coherently: a `templateRef` names an
/// existing template and comes with a `templatePatch`; a patch never appears
/// without a reference; a role without a reference has its own template.
///
/// An inline `template` next to `templateRef` is accepted and ignored.
pub fn validate_role_template_references(spec: &RoleBasedGroupSpec) -> Result<(), ValidationError> {
    let index_by_name = TemplateIndex::new(spec);
    let mut role_names: BTreeSet<&str> = BTreeSet::new();
    for (index, role) in spec.roles.iter().enumerate() {
        match role.template_source() {
            TemplateSource::Reference { template_ref, patch } => {
                if !index_by_name.contains(template_ref) {
                    return Err(ValidationError::TemplateRefNotFound {
                        index,
                        role: role.name.clone(),
                        template_ref: template_ref.to_string(),
                    });
                }
                if patch.is_none() {
                    return Err(ValidationError::MissingTemplatePatch { index, role: role.name.clone() });
                }
            }
            TemplateSource::Direct(template) => {
                if role.template_patch.is_some() {
                    return Err(ValidationError::PatchWithoutReference { index, role: role.name.clone() });
                }
                if template.is_none() {
                    return Err(ValidationError::MissingTemplate { index, role: role.name.clone() });
                }
            }
        }
        if !role_names.insert(role.name.as_str()) {
            return Err(ValidationError::DuplicateRoleName { index, role: role.name.clone() });
        }
    }
    Ok(())
}

/// Runs both passes; a group is admitted only when both succeed.
pub fn validate_group(spec: &RoleBasedGroupSpec) -> Result<(), ValidationError> {
    validate_role_templates(spec)?;
    validate_role_template_references(spec)
}

impl RoleBasedGroupSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_group(self)
    }
}
