//! Template resolution: turns every role of a group into its effective pod
//! template, either the role's own template or a shared template with the
//! role's patch applied.
//!
//! Resolution assumes the group passed [`rbg_core::validate_group`]. Roles
//! that break those invariants still get an error rather than a panic, and a
//! failing role never affects the others.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use rbg_core::{RoleBasedGroupSpec, RoleSpec, TemplateIndex, TemplateSource};
use rbg_patch::{merge_patch_with, MergeOptions, PatchError};
use serde::Serialize;
use tracing::{debug, warn};

/// Where a resolved template came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ResolvedFrom {
    Direct,
    TemplateRef { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTemplate {
    pub role: String,
    pub from: ResolvedFrom,
    pub template: PodTemplateSpec,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("role {role:?}: template {template_ref:?} not found in spec.roleTemplates")]
    TemplateNotFound { role: String, template_ref: String },
    #[error("role {role:?}: templatePatch required when templateRef is set")]
    MissingPatch { role: String },
    #[error("role {role:?}: no template and no templateRef")]
    MissingTemplate { role: String },
    #[error("role {role:?}: applying templatePatch to {template_ref:?}: {source}")]
    Patch {
        role: String,
        template_ref: String,
        #[source]
        source: PatchError,
    },
}

impl ResolveError {
    pub fn role(&self) -> &str {
        match self {
            Self::TemplateNotFound { role, .. }
            | Self::MissingPatch { role }
            | Self::MissingTemplate { role }
            | Self::Patch { role, .. } => role,
        }
    }
}

/// Resolves roles of one group against a template index built for this pass.
pub struct Resolver<'a> {
    index: TemplateIndex<'a>,
    options: MergeOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(spec: &'a RoleBasedGroupSpec) -> Self {
        Self::with_options(spec, MergeOptions::default())
    }

    pub fn with_options(spec: &'a RoleBasedGroupSpec, options: MergeOptions) -> Self {
        Self { index: TemplateIndex::new(spec), options }
    }

    pub fn resolve_role(&self, role: &RoleSpec) -> Result<ResolvedTemplate, ResolveError> {
        match role.template_source() {
            TemplateSource::Direct(Some(template)) => Ok(ResolvedTemplate {
                role: role.name.clone(),
                from: ResolvedFrom::Direct,
                template: template.clone(),
            }),
            TemplateSource::Direct(None) => Err(ResolveError::MissingTemplate { role: role.name.clone() }),
            TemplateSource::Reference { template_ref, patch } => {
                let base = self.index.get(template_ref).ok_or_else(|| ResolveError::TemplateNotFound {
                    role: role.name.clone(),
                    template_ref: template_ref.to_string(),
                })?;
                let patch = patch.ok_or_else(|| ResolveError::MissingPatch { role: role.name.clone() })?;
                let template = merge_patch_with(&base.template, patch, &self.options).map_err(|source| {
                    ResolveError::Patch { role: role.name.clone(), template_ref: template_ref.to_string(), source }
                })?;
                debug!(role = %role.name, template = %template_ref, "resolved role from shared template");
                Ok(ResolvedTemplate {
                    role: role.name.clone(),
                    from: ResolvedFrom::TemplateRef { name: template_ref.to_string() },
                    template,
                })
            }
        }
    }

    /// Every role in declaration order.
    pub fn resolve_all<'r>(
        &self,
        roles: &'r [RoleSpec],
    ) -> Vec<(&'r RoleSpec, Result<ResolvedTemplate, ResolveError>)> {
        roles
            .iter()
            .map(|role| {
                let res = self.resolve_role(role);
                if let Err(e) = &res {
                    warn!(role = %role.name, error = %e, "role template resolution failed");
                }
                (role, res)
            })
            .collect()
    }
}

/// Resolves every role of `spec`, keyed by role name.
pub fn resolve(spec: &RoleBasedGroupSpec) -> BTreeMap<String, Result<ResolvedTemplate, ResolveError>> {
    Resolver::new(spec)
        .resolve_all(&spec.roles)
        .into_iter()
        .map(|(role, res)| (role.name.clone(), res))
        .collect()
}
