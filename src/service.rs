//! Reconcile Service
//!
//! The context object a process boots: owns the orchestrator, dedup engine,
//! scheduler and validator over one ledger and one pair of registers.
//! Nothing here is global; independent instances do not share state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dedup::{DedupReport, DeduplicationEngine, DuplicateAnalysis};
use crate::domain::{LedgerEntry, NewLedgerEntry, Origin, Register};
use crate::gateway::{GatewayError, LedgerGateway, SourceRegisters};
use crate::jobs::{CycleReport, DedupScheduler, SchedulerConfig, SchedulerConfigPatch};
use crate::notify::{Notifier, DEFAULT_CAPACITY};
use crate::sync::{ListenerState, SyncConfig, SyncOrchestrator, SyncReport, SyncStatus};
use crate::validation::{ConsistencyValidator, RepairReport, ValidationReport};

/// Settings the service is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
    pub notification_capacity: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            scheduler: SchedulerConfig::default(),
            notification_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Combined view of sync, consistency and duplicates
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub sync: SyncStatus,
    pub validation: ValidationReport,
    pub duplicate_groups: usize,
    pub checked_at: DateTime<Utc>,
}

/// Result of a manual entry request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManualEntryResult {
    pub created: bool,
    /// The new entry, or the existing one that refused it
    pub entry_id: Uuid,
}

pub struct ReconcileService {
    ledger: Arc<dyn LedgerGateway>,
    notifier: Notifier,
    orchestrator: SyncOrchestrator,
    dedup: DeduplicationEngine,
    scheduler: DedupScheduler,
    validator: ConsistencyValidator,
}

impl ReconcileService {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        registers: SourceRegisters,
        settings: ServiceSettings,
    ) -> Self {
        let notifier = Notifier::new(settings.notification_capacity);
        let orchestrator = SyncOrchestrator::new(
            ledger.clone(),
            registers.clone(),
            notifier.clone(),
            settings.sync,
        );
        let dedup = DeduplicationEngine::new(ledger.clone());
        let scheduler =
            DedupScheduler::with_config(dedup.clone(), notifier.clone(), settings.scheduler);
        let validator = ConsistencyValidator::new(ledger.clone(), registers, orchestrator.clone());

        Self {
            ledger,
            notifier,
            orchestrator,
            dedup,
            scheduler,
            validator,
        }
    }

    /// Stop the scheduler and detach every listener
    pub async fn close(&self) {
        self.scheduler.stop().await;
        self.orchestrator.cleanup().await;
        tracing::info!("Reconcile service closed");
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn dedup(&self) -> &DeduplicationEngine {
        &self.dedup
    }

    pub fn scheduler(&self) -> &DedupScheduler {
        &self.scheduler
    }

    pub fn validator(&self) -> &ConsistencyValidator {
        &self.validator
    }

    // =========================================================================
    // Sync
    // =========================================================================

    pub async fn initialize_sync(&self) -> SyncReport {
        self.orchestrator.initialize().await
    }

    pub async fn restart(&self) -> SyncReport {
        self.orchestrator.restart().await
    }

    pub async fn cleanup(&self) {
        self.orchestrator.cleanup().await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.orchestrator.get_status().await
    }

    pub async fn sync_all_existing_data(&self) -> SyncReport {
        self.orchestrator.sync_all_existing_data().await
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    pub async fn validate(&self) -> Result<ValidationReport, GatewayError> {
        self.validator.validate().await
    }

    pub async fn repair(&self) -> Result<RepairReport, GatewayError> {
        self.validator.repair().await
    }

    pub async fn health_check(&self) -> Result<HealthReport, GatewayError> {
        let sync = self.orchestrator.get_status().await;
        let validation = self.validator.validate().await?;
        let analysis = self.dedup.analyze().await?;

        let mut issues = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();
        let mut recommend = |text: &str| {
            if !recommendations.iter().any(|r| r == text) {
                recommendations.push(text.to_string());
            }
        };

        for register in Register::ALL {
            match sync.register(register).state {
                ListenerState::Active => {}
                ListenerState::Error => {
                    issues.push(format!("{register} listener failed"));
                    recommend("Restart sync to re-subscribe failed listeners");
                }
                state => {
                    issues.push(format!("{register} listener is not attached ({state:?})"));
                    recommend("Initialize sync to attach listeners");
                }
            }
        }

        for register in Register::ALL {
            let missing = validation.missing(register);
            if missing > 0 {
                issues.push(format!("{missing} {register} records have no ledger entry"));
                recommend("Run repair to create missing entries");
            }
        }

        if validation.orphan_count > 0 {
            issues.push(format!(
                "{} ledger entries reference missing source records",
                validation.orphan_count
            ));
            recommend("Run repair to remove orphaned entries");
        }

        if validation.duplicate_origin_count > 0 {
            issues.push(format!(
                "{} source records are mapped to several entries",
                validation.duplicate_origin_count
            ));
            recommend("Run repair to collapse entries sharing a source record");
        }

        if analysis.has_duplicates() {
            issues.push(format!(
                "{} duplicate entries across {} signatures",
                analysis.total_duplicates,
                analysis.duplicate_groups.len()
            ));
            recommend("Run dedup remove to delete duplicate entries");
        }

        Ok(HealthReport {
            is_healthy: issues.is_empty(),
            issues,
            recommendations,
            sync,
            validation,
            duplicate_groups: analysis.duplicate_groups.len(),
            checked_at: Utc::now(),
        })
    }

    // =========================================================================
    // Dedup
    // =========================================================================

    pub async fn analyze_duplicates(&self) -> Result<DuplicateAnalysis, GatewayError> {
        self.dedup.analyze().await
    }

    pub async fn remove_duplicates(&self) -> Result<DedupReport, GatewayError> {
        self.dedup.remove().await
    }

    pub async fn force_check(&self) -> Result<CycleReport, GatewayError> {
        self.scheduler.force_check().await
    }

    /// Start the scheduler, with its current configuration when none is given
    pub async fn start_scheduler(&self, config: Option<SchedulerConfig>) -> bool {
        let config = match config {
            Some(config) => config,
            None => self.scheduler.config().await,
        };
        self.scheduler.start(config).await
    }

    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await
    }

    pub async fn update_scheduler_config(&self, patch: SchedulerConfigPatch) -> SchedulerConfig {
        self.scheduler.update_config(patch).await
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    pub async fn list_entries(&self) -> Result<Vec<LedgerEntry>, GatewayError> {
        let mut entries = self.ledger.list().await?;
        entries.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(entries)
    }

    pub async fn get_entry(&self, id: Uuid) -> Result<Option<LedgerEntry>, GatewayError> {
        self.ledger.get(id).await
    }

    /// Record a hand-entered movement unless the same event is already there
    pub async fn create_manual_entry(
        &self,
        mut entry: NewLedgerEntry,
    ) -> Result<ManualEntryResult, GatewayError> {
        entry.origin = Origin::Manual;
        entry.origin_id = None;

        let check = self.dedup.prevent_on_create(&entry).await?;
        if let Some(existing_id) = check.existing_id.filter(|_| !check.allowed) {
            tracing::info!(%existing_id, "Manual entry refused as duplicate");
            return Ok(ManualEntryResult {
                created: false,
                entry_id: existing_id,
            });
        }

        let entry_id = self.ledger.create(entry).await?;
        tracing::info!(%entry_id, "Manual entry created");
        Ok(ManualEntryResult {
            created: true,
            entry_id,
        })
    }
}
