//! Sync module
//!
//! Mirrors the tuition and payroll registers into the unified ledger.

mod error;
mod listener;
mod orchestrator;
mod status;

pub use error::{SyncError, SyncErrorRecord};
pub use orchestrator::{BackfillReport, SyncConfig, SyncOrchestrator, SyncReport};
pub use status::{
    ListenerState, RegisterStatus, SyncOutcome, SyncStatus, RECENT_ERROR_CAPACITY,
};
