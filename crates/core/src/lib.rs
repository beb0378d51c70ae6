//! RoleBasedGroup core types, name checks and reference validation.

#![forbid(unsafe_code)]

mod dns;
mod index;
mod types;
mod validate;

pub use dns::{is_dns_label, DNS_LABEL_MAX_LEN};
pub use index::TemplateIndex;
pub use types::{
    RoleBasedGroup, RoleBasedGroupSpec, RoleSpec, RoleTemplate, TemplateRef, TemplateSource, WorkloadSpec,
};
pub use validate::{validate_group, validate_role_template_references, validate_role_templates, ValidationError};

/// Label carried by every workload rendered for a group.
pub const GROUP_NAME_LABEL: &str = "rolebasedgroup.workloads.x-k8s.io/name";
/// Label naming the role a rendered workload belongs to.
pub const ROLE_NAME_LABEL: &str = "rolebasedgroup.workloads.x-k8s.io/role";
/// Annotation holding the fingerprint a workload was last rendered from.
pub const ROLE_REVISION_ANNOTATION: &str = "rolebasedgroup.workloads.x-k8s.io/role-revision";
