//! Domain Events
//!
//! Change notifications consumed from the source registers and the
//! notifications this engine publishes for observers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Origin, SourceRecord};

/// One change reported by a register's change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record")]
pub enum ChangeEvent {
    Added(SourceRecord),
    Modified(SourceRecord),
    /// Only the id survives a removal
    Removed(String),
}

impl ChangeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::Added(_) => "Added",
            ChangeEvent::Modified(_) => "Modified",
            ChangeEvent::Removed(_) => "Removed",
        }
    }
}

/// Notifications broadcast to external observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// A source record was mirrored into the ledger
    SyncCompleted {
        origin: Origin,
        origin_id: String,
        entry_id: Uuid,
        amount: Decimal,
        time: DateTime<Utc>,
    },

    /// A source record could not be mirrored
    SyncError {
        origin: Origin,
        origin_id: Option<String>,
        message: String,
        time: DateTime<Utc>,
    },

    /// A dedup cycle finished
    DeduplicationCompleted {
        removed: usize,
        kept: usize,
        errors: usize,
        time: DateTime<Utc>,
    },

    /// Advisory: more duplicates found than the configured threshold
    DuplicateAlert {
        duplicates: usize,
        threshold: usize,
        time: DateTime<Utc>,
    },
}

impl Notification {
    pub fn event_type(&self) -> &'static str {
        match self {
            Notification::SyncCompleted { .. } => "SyncCompleted",
            Notification::SyncError { .. } => "SyncError",
            Notification::DeduplicationCompleted { .. } => "DeduplicationCompleted",
            Notification::DuplicateAlert { .. } => "DuplicateAlert",
        }
    }
}
