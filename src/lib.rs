//! ledger_reconcile Library
//!
//! Keeps a unified ledger consistent with the tuition and payroll
//! registers. Re-exports modules for integration testing and external use.

pub mod api;
pub mod dedup;
pub mod domain;
pub mod gateway;
pub mod jobs;
pub mod notify;
pub mod projection;
pub mod service;
pub mod sync;
pub mod validation;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{
    Amount, AmountError, ChangeEvent, LedgerEntry, NewLedgerEntry, Notification,
    OperationContext, Origin, Register, SourceRecord,
};
pub use service::{ReconcileService, ServiceSettings};
