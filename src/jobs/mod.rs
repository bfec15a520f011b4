//! Background worker supervision
//!
//! All loops share one pattern: a `CancellationToken` stop signal observed
//! at a 1-second cadence, wall-clock next-due times, and a status record
//! behind a supervisor-local mutex. Errors are recorded and the loop
//! resumes on the next tick — a failing job never takes the process down.

pub mod measurement_sync;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backbone::{retention, rollup};
use crate::config::AppConfig;
use crate::orchestrator::scheduler::{next_aligned_trigger, preset_minute_set};
use crate::orchestrator::Orchestrator;
use crate::prefs::PreferenceCache;
use crate::types::TriggerSource;

use measurement_sync::{run_measurement_sync, SyncTrigger};

const POLL_QUANTUM: Duration = Duration::from_secs(1);

/// Last-known state of one worker loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub last_tick_ts: Option<DateTime<Utc>>,
    pub next_due_ts: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub type SharedWorkerStatus = Arc<Mutex<WorkerStatus>>;

/// Handles for every supervised worker, exposed to the API layer.
#[derive(Clone)]
pub struct JobSupervisor {
    pub cancel: CancellationToken,
    pub data_pipeline: SharedWorkerStatus,
    pub scheduler: SharedWorkerStatus,
    pub measurement_sync: SharedWorkerStatus,
}

impl JobSupervisor {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            data_pipeline: Arc::new(Mutex::new(WorkerStatus::default())),
            scheduler: Arc::new(Mutex::new(WorkerStatus::default())),
            measurement_sync: Arc::new(Mutex::new(WorkerStatus::default())),
        }
    }

    /// Spawn all worker loops. Each owns its own pool checkouts; stop
    /// takes effect within one poll quantum plus in-flight work.
    pub fn start(
        &self,
        pool: PgPool,
        config: AppConfig,
        orchestrator: Orchestrator,
        prefs: Arc<PreferenceCache>,
    ) {
        tokio::spawn(run_data_pipeline_loop(
            pool.clone(),
            config.clone(),
            self.data_pipeline.clone(),
            self.cancel.clone(),
        ));
        info!("Data pipeline worker started");

        tokio::spawn(run_scheduler_loop(
            orchestrator.clone(),
            prefs.clone(),
            self.scheduler.clone(),
            self.cancel.clone(),
        ));
        info!("Aligned scheduler worker started");

        tokio::spawn(run_measurement_sync_loop(
            pool,
            config,
            orchestrator,
            prefs,
            self.measurement_sync.clone(),
            self.cancel.clone(),
        ));
        info!("Measurement sync worker started");
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Default for JobSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

async fn set_status<F: FnOnce(&mut WorkerStatus)>(status: &SharedWorkerStatus, mutate: F) {
    let mut guard = status.lock().await;
    mutate(&mut guard);
}

/// Rollup + retention on their own cadences.
async fn run_data_pipeline_loop(
    pool: PgPool,
    config: AppConfig,
    status: SharedWorkerStatus,
    cancel: CancellationToken,
) {
    set_status(&status, |s| s.running = true).await;
    let mut next_rollup = Utc::now();
    let mut next_retention = Utc::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(POLL_QUANTUM) => {}
        }

        let now = Utc::now();
        set_status(&status, |s| {
            s.last_tick_ts = Some(now);
            s.next_due_ts = Some(next_rollup.min(next_retention));
        })
        .await;

        if now >= next_rollup {
            if let Err(err) = rollup::run_rollup_job(&pool).await {
                error!(error = %err, "Rollup job failed");
                set_status(&status, |s| s.last_error = Some(err.to_string())).await;
            } else {
                set_status(&status, |s| s.last_error = None).await;
            }
            next_rollup = now + chrono::Duration::seconds(config.data_rollup_job_seconds as i64);
        }

        if now >= next_retention {
            if let Err(err) = retention::run_retention_job(&pool, &config).await {
                error!(error = %err, "Retention job failed");
                set_status(&status, |s| s.last_error = Some(err.to_string())).await;
            }
            next_retention =
                now + chrono::Duration::seconds(config.data_retention_job_seconds as i64);
        }
    }
    set_status(&status, |s| s.running = false).await;
    info!("Data pipeline worker stopped");
}

/// Aligned scheduler: fires runs at the configured wall-clock minutes.
/// An auto-run preset (persisted preference) supplies the minute set when
/// set; otherwise the static configuration does.
async fn run_scheduler_loop(
    orchestrator: Orchestrator,
    prefs: Arc<PreferenceCache>,
    status: SharedWorkerStatus,
    cancel: CancellationToken,
) {
    set_status(&status, |s| s.running = true).await;

    let config = orchestrator.config().clone();
    let mut next_due: Option<DateTime<Utc>> = None;
    let mut active_minutes: Vec<u32> = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(POLL_QUANTUM) => {}
        }

        let now = Utc::now();
        let snapshot = prefs.load();
        let preset_minutes = preset_minute_set(&snapshot.auto_run_preset);

        let (enabled, minutes, trigger) = match &preset_minutes {
            Some(minutes) => (true, minutes.clone(), TriggerSource::AutoPreset),
            None => (
                config.eos_aligned_scheduler_enabled,
                config.aligned_scheduler_minute_set(),
                TriggerSource::AlignedScheduler,
            ),
        };

        // A preset flip changes the minute set; recompute the next due
        // instant instead of firing on the stale one.
        if minutes != active_minutes {
            active_minutes = minutes.clone();
            next_due = None;
        }

        if !enabled {
            next_due = None;
            set_status(&status, |s| {
                s.last_tick_ts = Some(now);
                s.next_due_ts = None;
            })
            .await;
            orchestrator
                .update_status(|collector| collector.aligned_scheduler_next_due_ts = None)
                .await;
            continue;
        }

        let due = match next_due {
            Some(due) => due,
            None => {
                let due =
                    next_aligned_trigger(now, &minutes, config.eos_aligned_scheduler_delay_seconds);
                next_due = Some(due);
                due
            }
        };

        set_status(&status, |s| {
            s.last_tick_ts = Some(now);
            s.next_due_ts = Some(due);
        })
        .await;
        orchestrator
            .update_status(|collector| {
                collector.running = true;
                collector.aligned_scheduler_next_due_ts = Some(due);
                collector.auto_run_preset = snapshot.auto_run_preset.clone();
            })
            .await;

        if now >= due {
            next_due = Some(next_aligned_trigger(
                now,
                &minutes,
                config.eos_aligned_scheduler_delay_seconds,
            ));
            match orchestrator.run_if_idle(trigger).await {
                Ok(_) => set_status(&status, |s| s.last_error = None).await,
                Err(err) => {
                    error!(error = %err, "Scheduled run failed");
                    set_status(&status, |s| s.last_error = Some(err.to_string())).await;
                }
            }
        }
    }
    set_status(&status, |s| s.running = false).await;
    info!("Aligned scheduler worker stopped");
}

/// Measurement sync on its own cadence, honoring the persisted enable
/// toggle.
async fn run_measurement_sync_loop(
    pool: PgPool,
    config: AppConfig,
    orchestrator: Orchestrator,
    prefs: Arc<PreferenceCache>,
    status: SharedWorkerStatus,
    cancel: CancellationToken,
) {
    if !config.eos_measurement_sync_enabled {
        info!("Measurement sync disabled by configuration");
        return;
    }
    set_status(&status, |s| s.running = true).await;

    let client = orchestrator.client();
    let mut next_sync = Utc::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(POLL_QUANTUM) => {}
        }

        let now = Utc::now();
        set_status(&status, |s| {
            s.last_tick_ts = Some(now);
            s.next_due_ts = Some(next_sync);
        })
        .await;

        if now < next_sync {
            continue;
        }
        next_sync = now + chrono::Duration::seconds(config.eos_measurement_sync_seconds as i64);

        if !prefs.load().measurement_sync_enabled {
            continue;
        }

        match run_measurement_sync(&pool, &client, SyncTrigger::Periodic).await {
            Ok(_) => set_status(&status, |s| s.last_error = None).await,
            Err(err) => {
                error!(error = %err, "Measurement sync failed");
                set_status(&status, |s| s.last_error = Some(err.to_string())).await;
            }
        }
    }
    set_status(&status, |s| s.running = false).await;
    info!("Measurement sync worker stopped");
}
