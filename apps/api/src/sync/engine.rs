//! Sync orchestrator: owns the sync lifecycle and the single in-flight guard.
//!
//! Every entry point (scheduler tick, manual trigger, delete) must acquire the
//! guard through `try_begin`; a second caller is rejected, never queued.
//! The state mutex is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dedup::{self, Candidate, ProcessedSet};
use super::identity;
use super::transform::to_remote_row;
use super::{DeleteReport, SyncError, SyncOutcome, SyncReport, SyncStatus, DELETE_CHUNK_SIZE};
use crate::backend::DiaryBackend;
use crate::models::user::RemoteUser;
use crate::store::{self, LocalStore, AUTO_SYNC_KEY, LAST_SYNC_KEY};

#[derive(Debug, Default)]
struct EngineState {
    in_progress: bool,
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    processed: ProcessedSet,
    current_user: Option<RemoteUser>,
    runs: u64,
}

pub struct SyncEngine {
    /// `None` means offline mode: every operation succeeds without I/O.
    backend: Option<Arc<dyn DiaryBackend>>,
    store: Arc<dyn LocalStore>,
    default_username: Option<String>,
    state: Mutex<EngineState>,
}

/// Releases the in-progress flag however the run ends.
struct RunGuard<'a> {
    engine: &'a SyncEngine,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.engine.state().in_progress = false;
    }
}

impl SyncEngine {
    pub fn new(
        backend: Option<Arc<dyn DiaryBackend>>,
        store: Arc<dyn LocalStore>,
        default_username: Option<String>,
    ) -> Self {
        let last_sync_at = store
            .get(LAST_SYNC_KEY)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|ts| ts.with_timezone(&Utc));
        Self {
            backend,
            store,
            default_username,
            state: Mutex::new(EngineState {
                last_sync_at,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_begin(&self) -> Result<RunGuard<'_>, SyncError> {
        let mut state = self.state();
        if state.in_progress {
            debug!("Sync already in progress, rejecting");
            return Err(SyncError::AlreadyRunning);
        }
        state.in_progress = true;
        state.runs += 1;
        Ok(RunGuard { engine: self })
    }

    pub fn is_offline(&self) -> bool {
        self.backend.is_none()
    }

    pub fn is_enabled(&self) -> bool {
        store::auto_sync_enabled(self.store.as_ref())
    }

    pub fn is_running(&self) -> bool {
        self.state().in_progress
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), SyncError> {
        self.store
            .set(AUTO_SYNC_KEY, if enabled { "true" } else { "false" })?;
        info!("Auto-sync {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn status(&self) -> SyncStatus {
        let enabled = self.is_enabled();
        let state = self.state();
        SyncStatus {
            offline: self.is_offline(),
            enabled,
            in_progress: state.in_progress,
            last_sync_at: state.last_sync_at,
            last_error: state.last_error.clone(),
            processed_ids: state.processed.id_count(),
            processed_keys: state.processed.key_count(),
            runs: state.runs,
            current_user: state.current_user.as_ref().map(|u| u.line_username.clone()),
        }
    }

    /// Incremental sync: uploads entries not yet seen by this process.
    pub async fn run_sync(&self) -> Result<SyncOutcome, SyncError> {
        let Some(backend) = self.backend.as_deref() else {
            debug!("Offline mode, skipping sync");
            return Ok(SyncOutcome::Offline);
        };
        let _guard = self.try_begin()?;
        self.state().last_error = None;
        self.record_result(self.upload(backend).await)
    }

    /// Forgets what was uploaded before and reconciles every local entry.
    pub async fn trigger_manual_sync(&self) -> Result<SyncOutcome, SyncError> {
        let Some(backend) = self.backend.as_deref() else {
            debug!("Offline mode, skipping manual sync");
            return Ok(SyncOutcome::Offline);
        };
        let _guard = self.try_begin()?;
        {
            let mut state = self.state();
            state.last_error = None;
            state.processed.clear();
        }
        info!("Manual sync requested, processed sets cleared");
        self.record_result(self.upload(backend).await)
    }

    pub async fn delete_one(&self, id: &str) -> Result<DeleteReport, SyncError> {
        self.delete_many(&[id.to_string()]).await
    }

    /// Best-effort chunked delete: every chunk is attempted even after a failure.
    pub async fn delete_many(&self, ids: &[String]) -> Result<DeleteReport, SyncError> {
        let Some(backend) = self.backend.as_deref() else {
            debug!("Offline mode, skipping remote delete of {} ids", ids.len());
            return Ok(DeleteReport {
                requested: ids.len(),
                ..Default::default()
            });
        };
        if ids.is_empty() {
            return Ok(DeleteReport::default());
        }
        let _guard = self.try_begin()?;
        self.state().last_error = None;

        let mut report = DeleteReport {
            requested: ids.len(),
            ..Default::default()
        };
        for (n, chunk) in ids.chunks(DELETE_CHUNK_SIZE).enumerate() {
            report.chunks += 1;
            match backend.delete_entries(chunk).await {
                Ok(count) => report.deleted += count,
                Err(e) => {
                    let start = n * DELETE_CHUNK_SIZE;
                    error!(
                        "Delete batch {}..{} failed: {e}",
                        start,
                        start + chunk.len()
                    );
                    report.failed_chunks += 1;
                }
            }
        }

        {
            let mut state = self.state();
            for id in ids {
                state.processed.forget_id(id);
            }
        }
        self.advance_watermark();
        info!(
            "Delete sync finished: {}/{} rows removed",
            report.deleted, report.requested
        );

        if report.is_complete() {
            Ok(report)
        } else {
            let err = SyncError::PartialDelete(report);
            self.state().last_error = Some(err.to_string());
            Err(err)
        }
    }

    fn record_result(
        &self,
        result: Result<SyncOutcome, SyncError>,
    ) -> Result<SyncOutcome, SyncError> {
        match &result {
            Ok(_) => self.state().last_error = None,
            Err(e) => {
                error!("Sync failed: {e}");
                self.state().last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn upload(&self, backend: &dyn DiaryBackend) -> Result<SyncOutcome, SyncError> {
        let user_id = self.resolve_identity(backend).await?;

        let values = store::read_entry_values(self.store.as_ref());
        if values.is_empty() {
            debug!("No local entries to sync");
            self.advance_watermark();
            return Ok(SyncOutcome::Synced(SyncReport::default()));
        }

        let classification = {
            let state = self.state();
            dedup::classify(&values, &state.processed)
        };
        let mut report = SyncReport {
            total: values.len(),
            uploaded: 0,
            invalid: classification.invalid,
            duplicates: classification.duplicates,
            already_processed: classification.already_processed,
            repaired: classification.repaired(),
        };
        let candidates = classification.candidates;
        if candidates.is_empty() {
            debug!("Nothing new to sync ({} local entries)", report.total);
            self.advance_watermark();
            return Ok(SyncOutcome::Synced(report));
        }

        let now = Utc::now();
        let rows: Vec<_> = candidates
            .iter()
            .map(|c| to_remote_row(&c.entry, c.upload_id, user_id, now))
            .collect();
        info!(
            "Syncing {} of {} local entries for user {user_id}",
            rows.len(),
            report.total
        );
        backend.upsert_entries(&rows).await?;

        {
            let mut state = self.state();
            for c in &candidates {
                state.processed.record(&c.entry.id, &c.key);
                if c.repaired {
                    state.processed.record(&c.upload_id.to_string(), &c.key);
                }
            }
        }
        self.write_back_repairs(&candidates);
        self.advance_watermark();

        report.uploaded = rows.len();
        info!("Sync complete: {} entries uploaded", report.uploaded);
        Ok(SyncOutcome::Synced(report))
    }

    async fn resolve_identity(&self, backend: &dyn DiaryBackend) -> Result<Uuid, SyncError> {
        let username =
            identity::resolve_username(self.store.as_ref(), self.default_username.as_deref())?;
        let cached = self.state().current_user.clone();
        match identity::resolve_user(backend, &username, cached).await {
            Ok((user, id)) => {
                self.state().current_user = Some(user);
                Ok(id)
            }
            Err(e) => {
                self.state().current_user = None;
                Err(e.into())
            }
        }
    }

    /// Persists repaired ids so the entry keeps its new identity from now on.
    fn write_back_repairs(&self, candidates: &[Candidate]) {
        let repairs: Vec<&Candidate> = candidates.iter().filter(|c| c.repaired).collect();
        if repairs.is_empty() {
            return;
        }
        let mut values = store::read_entry_values(self.store.as_ref());
        let mut changed = 0;
        for repair in repairs {
            let target = values.iter_mut().find(|v| {
                store::parse_entry(v).is_some_and(|e| {
                    e.id == repair.entry.id && dedup::composite_key(&e) == repair.key
                })
            });
            if let Some(value) = target {
                value["id"] = Value::String(repair.upload_id.to_string());
                changed += 1;
            }
        }
        if changed > 0 {
            match store::write_entry_values(self.store.as_ref(), &values) {
                Ok(()) => debug!("Wrote {changed} repaired ids back to the local store"),
                Err(e) => warn!("Could not persist repaired ids: {e}"),
            }
        }
    }

    fn advance_watermark(&self) {
        let now = Utc::now();
        self.state().last_sync_at = Some(now);
        let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(e) = self.store.set(LAST_SYNC_KEY, &stamp) {
            warn!("Could not persist last sync time: {e}");
        }
    }
}
