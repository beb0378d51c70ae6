use std::collections::BTreeMap;

use metrics::counter;
use rbg_core::{validate_group, RoleBasedGroupSpec, ValidationError};
use rbg_patch::MergeOptions;
use rbg_resolve::{ResolveError, ResolvedTemplate, Resolver};
use serde::Serialize;
use tracing::{debug, info};

use crate::{compute_fingerprint, Fingerprint, RolloutMetadata};

/// Last applied fingerprint per role name, as kept by the caller.
pub type LastApplied = BTreeMap<String, Fingerprint>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "fingerprint", rename_all = "camelCase")]
pub enum Decision {
    Unchanged,
    Changed(Fingerprint),
}

impl Decision {
    pub fn is_changed(&self) -> bool {
        matches!(self, Decision::Changed(_))
    }
}

/// `Changed` unless `current` equals the last applied fingerprint. A role
/// with no previous record is always changed.
pub fn decide(current: &Fingerprint, last_applied: Option<&Fingerprint>) -> Decision {
    match last_applied {
        Some(prev) if prev == current => Decision::Unchanged,
        _ => Decision::Changed(current.clone()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("role {role:?}: encoding resolved template: {source}")]
    Encode {
        role: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RoleRevision {
    pub resolved: ResolvedTemplate,
    pub fingerprint: Fingerprint,
    pub previous: Option<Fingerprint>,
    pub decision: Decision,
}

#[derive(Debug)]
pub struct RolePlan {
    pub role: String,
    pub outcome: Result<RoleRevision, RevisionError>,
}

impl RolePlan {
    pub fn is_changed(&self) -> bool {
        self.outcome.as_ref().is_ok_and(|r| r.decision.is_changed())
    }
}

/// Per-role outcomes of one pass over a group, in role declaration order.
#[derive(Debug, Default)]
pub struct GroupPlan {
    pub roles: Vec<RolePlan>,
}

impl GroupPlan {
    pub fn get(&self, role: &str) -> Option<&RolePlan> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn changed_roles(&self) -> impl Iterator<Item = &RolePlan> + '_ {
        self.roles.iter().filter(|r| r.is_changed())
    }

    pub fn failed_roles(&self) -> impl Iterator<Item = &RolePlan> + '_ {
        self.roles.iter().filter(|r| r.outcome.is_err())
    }

    pub fn has_changes(&self) -> bool {
        self.changed_roles().next().is_some()
    }

    /// Fingerprints to record once the changed roles have been applied.
    pub fn fingerprints(&self) -> LastApplied {
        self.roles
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|rev| (r.role.clone(), rev.fingerprint.clone())))
            .collect()
    }
}

/// Validate, resolve, fingerprint and decide every role of a group.
///
/// A validation failure blocks the whole group; resolution failures are
/// reported per role.
pub fn plan(spec: &RoleBasedGroupSpec, last_applied: &LastApplied) -> Result<GroupPlan, ValidationError> {
    plan_with(spec, last_applied, MergeOptions::default())
}

pub fn plan_with(
    spec: &RoleBasedGroupSpec,
    last_applied: &LastApplied,
    options: MergeOptions,
) -> Result<GroupPlan, ValidationError> {
    validate_group(spec)?;
    let resolver = Resolver::with_options(spec, options);
    let mut out = GroupPlan::default();
    for (role, resolved) in resolver.resolve_all(&spec.roles) {
        let outcome = resolved.map_err(RevisionError::from).and_then(|resolved| {
            let fingerprint = compute_fingerprint(&resolved.template, RolloutMetadata::from(role))
                .map_err(|source| RevisionError::Encode { role: role.name.clone(), source })?;
            let previous = last_applied.get(&role.name).cloned();
            let decision = decide(&fingerprint, previous.as_ref());
            Ok(RoleRevision { resolved, fingerprint, previous, decision })
        });
        match &outcome {
            Ok(rev) if rev.decision.is_changed() => {
                counter!("rbg_role_changed_total", 1u64);
                debug!(role = %role.name, fingerprint = %rev.fingerprint.short(), previous = ?rev.previous.as_ref().map(|p| p.short()), "role template changed");
            }
            Ok(rev) => {
                counter!("rbg_role_unchanged_total", 1u64);
                debug!(role = %role.name, fingerprint = %rev.fingerprint.short(), "role template unchanged");
            }
            Err(_) => {
                counter!("rbg_role_resolve_errors_total", 1u64);
            }
        }
        out.roles.push(RolePlan { role: role.name.clone(), outcome });
    }
    info!(
        roles = out.roles.len(),
        changed = out.changed_roles().count(),
        failed = out.failed_roles().count(),
        "group plan computed"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decide_compares_with_last_applied() {
        let a = Fingerprint::from("aaaa");
        let b = Fingerprint::from("bbbb");
        assert_eq!(decide(&a, Some(&a)), Decision::Unchanged);
        assert_eq!(decide(&a, Some(&b)), Decision::Changed(a.clone()));
        assert_eq!(decide(&a, None), Decision::Changed(a.clone()));
    }

    #[test]
    fn decision_serializes_with_fingerprint() {
        let v = serde_json::to_value(Decision::Changed(Fingerprint::from("ab"))).unwrap();
        assert_eq!(v, serde_json::json!({ "decision": "changed", "fingerprint": "ab" }));
        let v = serde_json::to_value(Decision::Unchanged).unwrap();
        assert_eq!(v, serde_json::json!({ "decision": "unchanged" }));
    }
}
