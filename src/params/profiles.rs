//! Parameter profile and revision repository.
//!
//! Single-profile invariant: bootstrap guarantees one active profile; the
//! engine never creates a second. Revisions are append-only — the
//! `is_current_draft` / `is_last_applied` flags flip in place, guarded by
//! partial unique indexes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::info;

use crate::error::{DomainError, DomainResult};
use crate::types::{ProfileRevision, RevisionSource, ValidationStatus};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ParameterProfile {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const REVISION_SELECT: &str = r#"
    SELECT id, profile_id, revision_no, source, payload_json, validation_status,
           validation_issues_json, is_current_draft, is_last_applied, created_at, applied_at
    FROM parameter_profile_revisions
"#;

pub async fn get_active_profile(pool: &PgPool) -> DomainResult<Option<ParameterProfile>> {
    let row = sqlx::query_as::<_, ParameterProfile>(
        r#"SELECT id, name, description, is_active, created_at, updated_at
           FROM parameter_profiles WHERE is_active = TRUE"#,
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_current_draft_revision(
    pool: &PgPool,
    profile_id: i64,
) -> DomainResult<Option<ProfileRevision>> {
    let query = format!("{REVISION_SELECT} WHERE profile_id = $1 AND is_current_draft = TRUE");
    let row = sqlx::query_as::<_, ProfileRevision>(&query)
        .bind(profile_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_last_applied_revision(
    pool: &PgPool,
    profile_id: i64,
) -> DomainResult<Option<ProfileRevision>> {
    let query = format!("{REVISION_SELECT} WHERE profile_id = $1 AND is_last_applied = TRUE");
    let row = sqlx::query_as::<_, ProfileRevision>(&query)
        .bind(profile_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_revision_by_id(
    pool: &PgPool,
    profile_id: i64,
    revision_id: i64,
) -> DomainResult<Option<ProfileRevision>> {
    let query = format!("{REVISION_SELECT} WHERE profile_id = $1 AND id = $2");
    let row = sqlx::query_as::<_, ProfileRevision>(&query)
        .bind(profile_id)
        .bind(revision_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_revisions(
    pool: &PgPool,
    profile_id: i64,
    limit: i64,
) -> DomainResult<Vec<ProfileRevision>> {
    let query = format!("{REVISION_SELECT} WHERE profile_id = $1 ORDER BY revision_no DESC LIMIT $2");
    let rows = sqlx::query_as::<_, ProfileRevision>(&query)
        .bind(profile_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Allocate the next revision number, clear any existing draft flag, and
/// insert the new revision as the current draft.
pub async fn create_profile_revision(
    pool: &PgPool,
    profile_id: i64,
    source: RevisionSource,
    payload: JsonValue,
    validation_status: ValidationStatus,
    validation_issues: Option<JsonValue>,
    set_current_draft: bool,
) -> DomainResult<ProfileRevision> {
    let mut tx = pool.begin().await?;

    if set_current_draft {
        sqlx::query(
            "UPDATE parameter_profile_revisions SET is_current_draft = FALSE WHERE profile_id = $1 AND is_current_draft = TRUE",
        )
        .bind(profile_id)
        .execute(&mut *tx)
        .await?;
    }

    let (next_revision_no,): (i32,) = sqlx::query_as(
        "SELECT COALESCE(MAX(revision_no), 0) + 1 FROM parameter_profile_revisions WHERE profile_id = $1",
    )
    .bind(profile_id)
    .fetch_one(&mut *tx)
    .await?;

    let query = format!(
        r#"INSERT INTO parameter_profile_revisions
            (profile_id, revision_no, source, payload_json, validation_status,
             validation_issues_json, is_current_draft, is_last_applied)
           VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
           RETURNING {}"#,
        "id, profile_id, revision_no, source, payload_json, validation_status, \
         validation_issues_json, is_current_draft, is_last_applied, created_at, applied_at"
    );
    let revision = sqlx::query_as::<_, ProfileRevision>(&query)
        .bind(profile_id)
        .bind(next_revision_no)
        .bind(source.as_str())
        .bind(&payload)
        .bind(validation_status.as_str())
        .bind(validation_issues)
        .bind(set_current_draft)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(revision)
}

/// Flip `is_last_applied` onto the given revision: the previous holder is
/// cleared, `applied_at` is stamped, and the revision stays the current
/// draft.
pub async fn mark_revision_as_last_applied(
    pool: &PgPool,
    profile_id: i64,
    revision_id: i64,
) -> DomainResult<ProfileRevision> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE parameter_profile_revisions SET is_last_applied = FALSE WHERE profile_id = $1 AND is_last_applied = TRUE",
    )
    .bind(profile_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE parameter_profile_revisions SET is_current_draft = FALSE WHERE profile_id = $1 AND is_current_draft = TRUE AND id <> $2",
    )
    .bind(profile_id)
    .bind(revision_id)
    .execute(&mut *tx)
    .await?;

    let query = format!(
        r#"UPDATE parameter_profile_revisions
           SET is_last_applied = TRUE, is_current_draft = TRUE, applied_at = now()
           WHERE profile_id = $1 AND id = $2
           RETURNING {}"#,
        "id, profile_id, revision_no, source, payload_json, validation_status, \
         validation_issues_json, is_current_draft, is_last_applied, created_at, applied_at"
    );
    let revision = sqlx::query_as::<_, ProfileRevision>(&query)
        .bind(profile_id)
        .bind(revision_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("revision {revision_id} not found")))?;

    tx.commit().await?;
    Ok(revision)
}

/// Bootstrap: ensure exactly one active profile with at least one revision
/// exists. Idempotent; never creates a second profile.
pub async fn ensure_bootstrap_profile(pool: &PgPool) -> DomainResult<ParameterProfile> {
    if let Some(profile) = get_active_profile(pool).await? {
        return Ok(profile);
    }

    let promoted = sqlx::query_as::<_, ParameterProfile>(
        r#"UPDATE parameter_profiles SET is_active = TRUE, updated_at = now()
           WHERE id = (SELECT id FROM parameter_profiles ORDER BY id ASC LIMIT 1)
           RETURNING id, name, description, is_active, created_at, updated_at"#,
    )
    .fetch_optional(pool)
    .await?;

    let profile = match promoted {
        Some(profile) => profile,
        None => {
            let profile = sqlx::query_as::<_, ParameterProfile>(
                r#"INSERT INTO parameter_profiles (name, description, is_active)
                   VALUES ('Current', 'Single internal setup state', TRUE)
                   ON CONFLICT (name) DO UPDATE SET is_active = TRUE, updated_at = now()
                   RETURNING id, name, description, is_active, created_at, updated_at"#,
            )
            .fetch_one(pool)
            .await?;
            info!(profile_id = profile.id, "Bootstrapped parameter profile");
            profile
        }
    };

    if get_current_draft_revision(pool, profile.id).await?.is_none() {
        let revision = create_profile_revision(
            pool,
            profile.id,
            RevisionSource::Bootstrap,
            serde_json::json!({}),
            ValidationStatus::Unknown,
            None,
            true,
        )
        .await?;
        mark_revision_as_last_applied(pool, profile.id, revision.id).await?;
    }

    Ok(profile)
}
