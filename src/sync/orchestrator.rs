//! Sync Orchestrator
//!
//! Owns the mapping from source records to ledger entries. Every record
//! operation goes through here, whether it comes from a live change feed,
//! a backfill, or a repair.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::dedup::DeduplicationEngine;
use crate::domain::{ChangeEvent, LedgerEntryPatch, Notification, Register, SourceRecord};
use crate::gateway::{InsertOutcome, LedgerGateway, SourceRegisters};
use crate::notify::Notifier;
use crate::projection::project;

use super::listener::{self, ListenerHandle};
use super::status::{ListenerState, StatusBook, SyncOutcome, SyncStatus};
use super::{SyncError, SyncErrorRecord};

/// Upper bound on entries deleted for one removed record
const MAX_CASCADE: usize = 32;

// =========================================================================
// Configuration & Reports
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Treat a modification of an unmapped record as an addition
    pub heal_on_modify: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heal_on_modify: true,
        }
    }
}

/// Result of backfilling one register
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub register: Register,
    pub total: usize,
    pub created: usize,
    pub already_synced: usize,
    pub skipped_duplicates: usize,
    pub errors: Vec<SyncErrorRecord>,
}

impl BackfillReport {
    fn new(register: Register) -> Self {
        Self {
            register,
            total: 0,
            created: 0,
            already_synced: 0,
            skipped_duplicates: 0,
            errors: Vec::new(),
        }
    }

    /// Records that now have an entry
    pub fn synced(&self) -> usize {
        self.created + self.already_synced
    }
}

/// Result of `initialize` or `sync_all_existing_data`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub total_synced: usize,
    pub total_created: usize,
    pub registers: Vec<BackfillReport>,
    /// Listener attachments that failed; the backfill still ran
    pub subscription_errors: Vec<SyncErrorRecord>,
}

impl SyncReport {
    fn push(&mut self, report: BackfillReport) {
        self.total_synced += report.synced();
        self.total_created += report.created;
        self.registers.push(report);
    }

    pub fn error_count(&self) -> usize {
        self.registers.iter().map(|r| r.errors.len()).sum::<usize>()
            + self.subscription_errors.len()
    }
}

// =========================================================================
// Orchestrator
// =========================================================================

/// Keeps the ledger in step with both source registers
#[derive(Clone)]
pub struct SyncOrchestrator {
    ledger: Arc<dyn LedgerGateway>,
    registers: SourceRegisters,
    dedup: DeduplicationEngine,
    notifier: Notifier,
    config: SyncConfig,
    status: Arc<RwLock<StatusBook>>,
    listeners: Arc<Mutex<HashMap<Register, ListenerHandle>>>,
}

impl SyncOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        registers: SourceRegisters,
        notifier: Notifier,
        config: SyncConfig,
    ) -> Self {
        Self {
            dedup: DeduplicationEngine::new(ledger.clone()),
            ledger,
            registers,
            notifier,
            config,
            status: Arc::new(RwLock::new(StatusBook::default())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> SyncConfig {
        self.config
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Backfill every register and attach its live listener.
    ///
    /// The feed is subscribed before the backfill lists the register, so an
    /// event landing in between is buffered and replayed through the same
    /// idempotent path. Registers already attached are left alone.
    pub async fn initialize(&self) -> SyncReport {
        let mut listeners = self.listeners.lock().await;
        let mut report = SyncReport::default();

        for register in Register::ALL {
            match self.status.read().await.state(register) {
                ListenerState::Active | ListenerState::Subscribing => {
                    tracing::debug!(%register, "Listener already attached");
                    continue;
                }
                _ => {}
            }

            // a listener that died on a feed error is finished; replace it
            listeners.remove(&register);
            self.set_state(register, ListenerState::Subscribing).await;

            let feed = match self.registers.get(register).subscribe().await {
                Ok(feed) => Some(feed),
                Err(e) => {
                    let err = SyncError::subscription(register, e.to_string());
                    tracing::error!(%register, error = %err, "Failed to subscribe to register");
                    report
                        .subscription_errors
                        .push(self.listener_failed(register, &err).await);
                    None
                }
            };

            report.push(self.backfill(register).await);

            if let Some(feed) = feed {
                // the listener may fail at once and mark itself Error
                self.set_state(register, ListenerState::Active).await;
                listeners.insert(register, listener::spawn(self.clone(), register, feed));
                tracing::info!(%register, "Listener attached");
            }
        }

        tracing::info!(
            synced = report.total_synced,
            created = report.total_created,
            errors = report.error_count(),
            "Sync initialized"
        );
        report
    }

    /// Detach every listener, keeping counters. A failed listener stays
    /// `Error` until restarted.
    pub async fn stop(&self) {
        let handles: Vec<(Register, ListenerHandle)> =
            self.listeners.lock().await.drain().collect();

        for (register, handle) in handles {
            handle.shutdown().await;
            tracing::info!(%register, "Listener detached");
        }

        let mut status = self.status.write().await;
        for register in Register::ALL {
            match status.state(register) {
                ListenerState::Uninitialized | ListenerState::Error => {}
                _ => status.register_mut(register).set_state(ListenerState::Stopped),
            }
        }
    }

    /// Detach every listener and forget all counters and errors
    pub async fn cleanup(&self) {
        self.stop().await;
        self.status.write().await.reset();
        tracing::info!("Sync state cleaned up");
    }

    /// Re-subscribe from scratch
    pub async fn restart(&self) -> SyncReport {
        tracing::info!("Restarting sync");
        self.cleanup().await;
        self.initialize().await
    }

    /// Never fails; reflects listener failures as state
    pub async fn get_status(&self) -> SyncStatus {
        self.status.read().await.snapshot()
    }

    // ---------------------------------------------------------------------
    // Bulk
    // ---------------------------------------------------------------------

    /// Backfill both registers without touching listeners
    pub async fn sync_all_existing_data(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for register in Register::ALL {
            report.push(self.backfill(register).await);
        }
        tracing::info!(
            synced = report.total_synced,
            created = report.total_created,
            errors = report.error_count(),
            "Existing data synced"
        );
        report
    }

    async fn backfill(&self, register: Register) -> BackfillReport {
        let mut report = BackfillReport::new(register);

        let records = match self.registers.get(register).list().await {
            Ok(records) => records,
            Err(e) => {
                let err = SyncError::from(e);
                tracing::error!(%register, error = %err, "Failed to list register");
                report.errors.push(self.record_failure(register, None, &err).await);
                return report;
            }
        };

        report.total = records.len();
        for record in records {
            let origin_id = record_id(&record);
            match self.on_record_added(record).await {
                Ok(SyncOutcome::Created { .. }) => report.created += 1,
                Ok(SyncOutcome::AlreadySynced { .. }) => report.already_synced += 1,
                Ok(SyncOutcome::SkippedDuplicate { .. }) => report.skipped_duplicates += 1,
                Ok(_) => {}
                Err(err) => {
                    report
                        .errors
                        .push(SyncErrorRecord::new(register, origin_id, &err));
                }
            }
        }

        tracing::debug!(
            %register,
            total = report.total,
            created = report.created,
            errors = report.errors.len(),
            "Backfill complete"
        );
        report
    }

    // ---------------------------------------------------------------------
    // Record operations
    // ---------------------------------------------------------------------

    /// Dispatch one feed event
    pub async fn handle_event(
        &self,
        register: Register,
        event: ChangeEvent,
    ) -> Result<SyncOutcome, SyncError> {
        match event {
            ChangeEvent::Added(record) => self.on_record_added(record).await,
            ChangeEvent::Modified(record) => self.on_record_modified(record).await,
            ChangeEvent::Removed(id) => self.on_record_removed(register, &id).await,
        }
    }

    /// Idempotent create: a record already mapped to an entry is a no-op
    pub async fn on_record_added(&self, record: SourceRecord) -> Result<SyncOutcome, SyncError> {
        let register = record.register();
        let origin_id = record_id(&record);
        let result = self.create_entry(&record).await;
        self.finish(register, origin_id, result).await
    }

    /// Re-project the source-derived fields of the mapped entry
    pub async fn on_record_modified(
        &self,
        record: SourceRecord,
    ) -> Result<SyncOutcome, SyncError> {
        let register = record.register();
        let origin_id = record_id(&record);
        let result = self.update_entry(&record).await;
        self.finish(register, origin_id, result).await
    }

    /// Delete every entry mapped to the removed record
    pub async fn on_record_removed(
        &self,
        register: Register,
        record_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let result = self.delete_entries(register, record_id).await;
        self.finish(register, Some(record_id.to_string()), result)
            .await
    }

    async fn create_entry(&self, record: &SourceRecord) -> Result<SyncOutcome, SyncError> {
        let origin = record.origin();
        if let Some(id) = record_id(record) {
            if let Some(existing) = self.ledger.find_by_origin(origin, &id).await? {
                return Ok(SyncOutcome::AlreadySynced {
                    entry_id: existing.id,
                });
            }
        }

        let projection = project(record)?;

        let check = self.dedup.prevent_on_create(&projection).await?;
        if let Some(existing_id) = check.existing_id.filter(|_| !check.allowed) {
            tracing::warn!(
                %origin,
                origin_id = ?projection.origin_id,
                %existing_id,
                "Entry with the same signature exists, create skipped"
            );
            return Ok(SyncOutcome::SkippedDuplicate { existing_id });
        }

        match self.ledger.insert_for_origin(projection).await? {
            InsertOutcome::Created(entry_id) => Ok(SyncOutcome::Created { entry_id }),
            InsertOutcome::Existing(entry_id) => Ok(SyncOutcome::AlreadySynced { entry_id }),
        }
    }

    async fn update_entry(&self, record: &SourceRecord) -> Result<SyncOutcome, SyncError> {
        let projection = project(record)?;
        let origin_id = projection.origin_id.clone().unwrap_or_default();

        match self.ledger.find_by_origin(projection.origin, &origin_id).await? {
            Some(existing) => {
                let patch = LedgerEntryPatch::source_derived(&projection);
                self.ledger.update(existing.id, patch).await?;
                Ok(SyncOutcome::Updated {
                    entry_id: existing.id,
                })
            }
            None if self.config.heal_on_modify => {
                tracing::debug!(origin = %projection.origin, %origin_id, "Modified record has no entry, creating");
                self.create_entry(record).await
            }
            None => {
                tracing::warn!(origin = %projection.origin, %origin_id, "Modified record has no entry");
                Ok(SyncOutcome::Missing)
            }
        }
    }

    async fn delete_entries(
        &self,
        register: Register,
        record_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let origin = register.origin();
        let mut deleted = 0;

        for _ in 0..MAX_CASCADE {
            let Some(entry) = self.ledger.find_by_origin(origin, record_id).await? else {
                break;
            };
            if self.ledger.delete(entry.id).await? {
                deleted += 1;
            }
        }

        if deleted == 0 {
            Ok(SyncOutcome::NotFound)
        } else {
            Ok(SyncOutcome::Deleted { count: deleted })
        }
    }

    // ---------------------------------------------------------------------
    // Bookkeeping
    // ---------------------------------------------------------------------

    async fn finish(
        &self,
        register: Register,
        origin_id: Option<String>,
        result: Result<SyncOutcome, SyncError>,
    ) -> Result<SyncOutcome, SyncError> {
        match &result {
            Ok(outcome) => {
                self.status.write().await.register_mut(register).record(outcome);
                self.announce(register, origin_id.as_deref(), outcome).await;
            }
            Err(err) => {
                tracing::warn!(%register, origin_id = ?origin_id, error = %err, "Record sync failed");
                self.record_failure(register, origin_id, err).await;
            }
        }
        result
    }

    async fn announce(&self, register: Register, origin_id: Option<&str>, outcome: &SyncOutcome) {
        let entry_id = match outcome {
            SyncOutcome::Created { entry_id } | SyncOutcome::Updated { entry_id } => *entry_id,
            _ => return,
        };

        // amount is read back so the notification carries what was stored
        let amount = match self.ledger.get(entry_id).await {
            Ok(Some(entry)) => entry.amount.value(),
            _ => return,
        };

        tracing::info!(%register, origin_id = ?origin_id, %entry_id, %amount, "Record synced");
        self.notifier.emit(Notification::SyncCompleted {
            origin: register.origin(),
            origin_id: origin_id.unwrap_or_default().to_string(),
            entry_id,
            amount,
            time: Utc::now(),
        });
    }

    async fn record_failure(
        &self,
        register: Register,
        origin_id: Option<String>,
        err: &SyncError,
    ) -> SyncErrorRecord {
        let record = SyncErrorRecord::new(register, origin_id.clone(), err);
        {
            let mut status = self.status.write().await;
            status.register_mut(register).record_failure();
            status.push_error(record.clone());
        }
        self.notifier.emit(Notification::SyncError {
            origin: register.origin(),
            origin_id,
            message: record.message.clone(),
            time: record.at,
        });
        record
    }

    /// Mark the register's listener as failed
    pub(crate) async fn listener_failed(
        &self,
        register: Register,
        err: &SyncError,
    ) -> SyncErrorRecord {
        let record = SyncErrorRecord::new(register, None, err);
        {
            let mut status = self.status.write().await;
            status.register_mut(register).set_state(ListenerState::Error);
            status.push_error(record.clone());
        }
        self.notifier.emit(Notification::SyncError {
            origin: register.origin(),
            origin_id: None,
            message: record.message.clone(),
            time: record.at,
        });
        record
    }

    async fn set_state(&self, register: Register, state: ListenerState) {
        self.status
            .write()
            .await
            .register_mut(register)
            .set_state(state);
    }
}

fn record_id(record: &SourceRecord) -> Option<String> {
    use crate::domain::SourceFields;
    let id = record.id().trim();
    (!id.is_empty()).then(|| id.to_string())
}
