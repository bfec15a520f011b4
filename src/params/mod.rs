//! Parameter & setup engine
//!
//! The single active profile carries an append-only revision history with
//! draft/applied flags; the setup-field surface and dynamic parameter
//! bindings both funnel into new `dynamic_input` revisions of its draft.

pub mod bindings;
pub mod catalog;
pub mod profiles;
pub mod setup_fields;
pub mod validate;

use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::error::{DomainError, DomainResult};
use crate::types::{ProfileRevision, RevisionSource, ValidationStatus};

pub use validate::{validate_payload, ValidationOutcome};

/// Validate a payload and persist it as a new draft revision.
pub async fn update_draft(
    pool: &PgPool,
    payload: JsonValue,
    source: RevisionSource,
) -> DomainResult<(ProfileRevision, ValidationOutcome)> {
    let profile = profiles::get_active_profile(pool)
        .await?
        .ok_or_else(|| DomainError::unavailable("no active parameter profile"))?;

    let outcome = validate_payload(&payload, &catalog::dynamic_parameter_catalog());
    let status = if outcome.valid {
        ValidationStatus::Valid
    } else {
        ValidationStatus::Invalid
    };
    let issues = serde_json::json!({"errors": outcome.errors, "warnings": outcome.warnings});

    let revision = profiles::create_profile_revision(
        pool,
        profile.id,
        source,
        outcome.normalized_payload.clone(),
        status,
        Some(issues),
        true,
    )
    .await?;
    Ok((revision, outcome))
}

/// Apply a revision: validate, then flip the `is_last_applied` flag onto
/// it. Fails with the validation reasons; never alters the payload.
pub async fn apply_revision(pool: &PgPool, revision_id: i64) -> DomainResult<ProfileRevision> {
    let profile = profiles::get_active_profile(pool)
        .await?
        .ok_or_else(|| DomainError::unavailable("no active parameter profile"))?;
    let revision = profiles::get_revision_by_id(pool, profile.id, revision_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("revision {revision_id} not found")))?;

    let outcome = validate_payload(&revision.payload_json, &catalog::dynamic_parameter_catalog());
    if !outcome.valid {
        return Err(DomainError::validation(format!(
            "revision {revision_id} failed validation: {}",
            outcome.errors.join("; ")
        )));
    }

    profiles::mark_revision_as_last_applied(pool, profile.id, revision.id).await
}
