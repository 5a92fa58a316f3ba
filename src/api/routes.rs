//! API Routes
//!
//! HTTP endpoint definitions for the operations the UI layer invokes.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dedup::{CreateCheck, DedupReport, DuplicateAnalysis};
use crate::domain::{
    Amount, EntryKind, EntryStatus, LedgerEntry, NewLedgerEntry, OperationContext, Origin,
};
use crate::error::AppError;
use crate::jobs::{CycleReport, SchedulerConfig, SchedulerConfigPatch};
use crate::service::{HealthReport, ManualEntryResult, ReconcileService};
use crate::sync::{SyncReport, SyncStatus};
use crate::validation::{RepairReport, ValidationReport};

/// Shared state of every handler
pub type AppState = Arc<ReconcileService>;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub kind: EntryKind,
    pub category: String,
    pub description: String,
    /// Amount as string for precise decimal
    pub amount: String,
    pub date: NaiveDate,
    pub payment_method: String,
    #[serde(default = "default_status")]
    pub status: EntryStatus,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

fn default_status() -> EntryStatus {
    EntryStatus::Validated
}

impl CreateEntryRequest {
    fn into_entry(self) -> Result<NewLedgerEntry, AppError> {
        let amount: Amount = self.amount.parse()?;

        if self.category.trim().is_empty() || self.description.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "category and description are required".to_string(),
            ));
        }

        Ok(NewLedgerEntry {
            kind: self.kind,
            category: self.category.trim().to_string(),
            description: self.description.trim().to_string(),
            amount,
            date: self.date,
            payment_method: self.payment_method.trim().to_string(),
            status: self.status,
            reference: self.reference,
            origin: Origin::Manual,
            origin_id: None,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub entries: Vec<LedgerEntry>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct SchedulerResponse {
    pub running: bool,
    pub config: SchedulerConfig,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Sync
        .route("/sync/status", get(sync_status))
        .route("/sync/initialize", post(initialize_sync))
        .route("/sync/restart", post(restart_sync))
        .route("/sync/cleanup", post(cleanup_sync))
        .route("/sync/backfill", post(sync_all_existing_data))
        // Consistency
        .route("/consistency/validate", get(validate))
        .route("/consistency/repair", post(repair))
        .route("/health/ledger", get(health_check))
        // Dedup
        .route("/dedup/analysis", get(analyze_duplicates))
        .route("/dedup/remove", post(remove_duplicates))
        .route("/dedup/force-check", post(force_check))
        .route("/dedup/prevent-check", post(prevent_check))
        // Scheduler
        .route("/scheduler", get(scheduler_status))
        .route("/scheduler/start", post(start_scheduler))
        .route("/scheduler/stop", post(stop_scheduler))
        .route("/scheduler/config", patch(update_scheduler_config))
        // Ledger
        .route("/ledger/entries", get(list_entries).post(create_entry))
        .route("/ledger/entries/:entry_id", get(get_entry))
}

// =========================================================================
// Sync
// =========================================================================

async fn sync_status(State(service): State<AppState>) -> Json<SyncStatus> {
    Json(service.sync_status().await)
}

async fn initialize_sync(
    State(service): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Json<SyncReport> {
    tracing::info!(correlation_id = ?context.correlation_id, "Sync initialization requested");
    Json(service.initialize_sync().await)
}

async fn restart_sync(
    State(service): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Json<SyncReport> {
    tracing::info!(correlation_id = ?context.correlation_id, "Sync restart requested");
    Json(service.restart().await)
}

async fn cleanup_sync(
    State(service): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> StatusCode {
    tracing::info!(correlation_id = ?context.correlation_id, "Sync cleanup requested");
    service.cleanup().await;
    StatusCode::NO_CONTENT
}

async fn sync_all_existing_data(State(service): State<AppState>) -> Json<SyncReport> {
    Json(service.sync_all_existing_data().await)
}

// =========================================================================
// Consistency
// =========================================================================

async fn validate(State(service): State<AppState>) -> Result<Json<ValidationReport>, AppError> {
    Ok(Json(service.validate().await?))
}

async fn repair(
    State(service): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<RepairReport>, AppError> {
    tracing::info!(
        correlation_id = ?context.correlation_id,
        requested_by = ?context.requested_by,
        "Repair requested"
    );
    Ok(Json(service.repair().await?))
}

async fn health_check(State(service): State<AppState>) -> Result<Json<HealthReport>, AppError> {
    Ok(Json(service.health_check().await?))
}

// =========================================================================
// Dedup
// =========================================================================

async fn analyze_duplicates(
    State(service): State<AppState>,
) -> Result<Json<DuplicateAnalysis>, AppError> {
    Ok(Json(service.analyze_duplicates().await?))
}

async fn remove_duplicates(
    State(service): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<DedupReport>, AppError> {
    tracing::info!(
        correlation_id = ?context.correlation_id,
        requested_by = ?context.requested_by,
        "Duplicate removal requested"
    );
    Ok(Json(service.remove_duplicates().await?))
}

async fn force_check(State(service): State<AppState>) -> Result<Json<CycleReport>, AppError> {
    Ok(Json(service.force_check().await?))
}

async fn prevent_check(
    State(service): State<AppState>,
    Json(request): Json<CreateEntryRequest>,
) -> Result<Json<CreateCheck>, AppError> {
    let candidate = request.into_entry()?;
    Ok(Json(service.dedup().prevent_on_create(&candidate).await?))
}

// =========================================================================
// Scheduler
// =========================================================================

async fn scheduler_status(State(service): State<AppState>) -> Json<SchedulerResponse> {
    let scheduler = service.scheduler();
    Json(SchedulerResponse {
        running: scheduler.is_running().await,
        config: scheduler.config().await,
    })
}

async fn start_scheduler(
    State(service): State<AppState>,
    config: Option<Json<SchedulerConfig>>,
) -> Json<SchedulerResponse> {
    let running = service.start_scheduler(config.map(|Json(c)| c)).await;
    Json(SchedulerResponse {
        running,
        config: service.scheduler().config().await,
    })
}

async fn stop_scheduler(State(service): State<AppState>) -> Json<SchedulerResponse> {
    service.stop_scheduler().await;
    Json(SchedulerResponse {
        running: false,
        config: service.scheduler().config().await,
    })
}

async fn update_scheduler_config(
    State(service): State<AppState>,
    Json(patch): Json<SchedulerConfigPatch>,
) -> Json<SchedulerResponse> {
    let config = service.update_scheduler_config(patch).await;
    Json(SchedulerResponse {
        running: service.scheduler().is_running().await,
        config,
    })
}

// =========================================================================
// Ledger
// =========================================================================

async fn list_entries(State(service): State<AppState>) -> Result<Json<EntriesResponse>, AppError> {
    let entries = service.list_entries().await?;
    Ok(Json(EntriesResponse {
        total: entries.len(),
        entries,
    }))
}

async fn get_entry(
    State(service): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<LedgerEntry>, AppError> {
    service
        .get_entry(entry_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::EntryNotFound(entry_id.to_string()))
}

/// Manual entry; refused with 409 when the same movement is already recorded
async fn create_entry(
    State(service): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<ManualEntryResult>), AppError> {
    let entry = request.into_entry()?;
    let result = service.create_manual_entry(entry).await?;

    tracing::info!(
        correlation_id = ?context.correlation_id,
        entry_id = %result.entry_id,
        created = result.created,
        "Manual entry request handled"
    );

    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(result)))
}
