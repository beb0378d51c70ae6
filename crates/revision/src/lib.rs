//! Role revisions: fingerprints of resolved role templates and the
//! changed/unchanged decision that drives rollouts.
//!
//! Nothing is cached between passes. Every pass recomputes every role's
//! resolved template, so editing a shared role template changes the
//! fingerprint of every role that references it.

#![forbid(unsafe_code)]

mod canonical;
mod fingerprint;
mod plan;

pub use canonical::{domain_hash_hex, stable_json_bytes};
pub use fingerprint::{compute_fingerprint, group_revision, Fingerprint, RolloutMetadata};
pub use plan::{decide, plan, plan_with, Decision, GroupPlan, LastApplied, RolePlan, RoleRevision, RevisionError};
