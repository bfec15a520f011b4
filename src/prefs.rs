//! Runtime preferences — persisted scheduler toggles
//!
//! A small key→JSON store behind the live scheduler switches (auto-run
//! preset, measurement-sync enabled). Workers read a lock-free snapshot
//! that is re-swapped whenever a preference changes.

use arc_swap::ArcSwap;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;

use crate::error::DomainResult;

pub const PREF_AUTO_RUN_PRESET: &str = "scheduler.auto_run_preset";
pub const PREF_MEASUREMENT_SYNC_ENABLED: &str = "measurement_sync.enabled";

pub async fn get_preference(pool: &PgPool, key: &str) -> DomainResult<Option<JsonValue>> {
    let row: Option<(JsonValue,)> =
        sqlx::query_as("SELECT value_json FROM runtime_preferences WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(value,)| value))
}

pub async fn set_preference(pool: &PgPool, key: &str, value: &JsonValue) -> DomainResult<()> {
    sqlx::query(
        r#"INSERT INTO runtime_preferences (key, value_json, updated_at)
           VALUES ($1, $2, now())
           ON CONFLICT (key) DO UPDATE SET value_json = EXCLUDED.value_json, updated_at = now()"#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// The snapshot workers read every tick.
#[derive(Debug, Clone)]
pub struct PreferenceSnapshot {
    pub auto_run_preset: String,
    pub measurement_sync_enabled: bool,
}

impl Default for PreferenceSnapshot {
    fn default() -> Self {
        Self {
            auto_run_preset: "off".to_string(),
            measurement_sync_enabled: true,
        }
    }
}

/// Lock-free preference cache: workers `load()`, mutations go through
/// [`PreferenceCache::refresh`] after the DB write.
pub struct PreferenceCache {
    snapshot: ArcSwap<PreferenceSnapshot>,
}

impl PreferenceCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot: ArcSwap::from_pointee(PreferenceSnapshot::default()),
        })
    }

    pub fn load(&self) -> Arc<PreferenceSnapshot> {
        self.snapshot.load_full()
    }

    /// Re-read the persisted preferences and swap the snapshot.
    pub async fn refresh(&self, pool: &PgPool) -> DomainResult<Arc<PreferenceSnapshot>> {
        let mut snapshot = PreferenceSnapshot::default();
        if let Some(preset) = get_preference(pool, PREF_AUTO_RUN_PRESET).await? {
            if let Some(preset) = preset.as_str() {
                snapshot.auto_run_preset = preset.to_string();
            }
        }
        if let Some(enabled) = get_preference(pool, PREF_MEASUREMENT_SYNC_ENABLED).await? {
            if let Some(enabled) = enabled.as_bool() {
                snapshot.measurement_sync_enabled = enabled;
            }
        }
        let snapshot = Arc::new(snapshot);
        self.snapshot.store(snapshot.clone());
        Ok(snapshot)
    }
}
