//! Sync Status
//!
//! Listener state machine and per-register counters, reported by
//! `SyncOrchestrator::get_status`.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Register;

use super::SyncErrorRecord;

/// Newest errors kept for status reporting
pub const RECENT_ERROR_CAPACITY: usize = 50;

/// Lifecycle of one register's listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    #[default]
    Uninitialized,
    Subscribing,
    Active,
    Error,
    Stopped,
}

impl ListenerState {
    pub fn is_attached(&self) -> bool {
        matches!(self, ListenerState::Active)
    }
}

/// What a single record operation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Created { entry_id: Uuid },
    /// An entry for the origin pair was already there
    AlreadySynced { entry_id: Uuid },
    /// Another entry already carries the projected signature
    SkippedDuplicate { existing_id: Uuid },
    Updated { entry_id: Uuid },
    Deleted { count: usize },
    /// Removal of a record that had no entry
    NotFound,
    /// Modification of a record with no entry while self-healing is off
    Missing,
}

impl SyncOutcome {
    pub fn entry_id(&self) -> Option<Uuid> {
        match self {
            SyncOutcome::Created { entry_id }
            | SyncOutcome::AlreadySynced { entry_id }
            | SyncOutcome::Updated { entry_id } => Some(*entry_id),
            SyncOutcome::SkippedDuplicate { existing_id } => Some(*existing_id),
            _ => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, SyncOutcome::Created { .. })
    }
}

/// Counters and listener state of one register
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegisterStatus {
    pub state: ListenerState,
    pub attached: bool,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl RegisterStatus {
    pub(crate) fn set_state(&mut self, state: ListenerState) {
        self.state = state;
        self.attached = state.is_attached();
    }

    pub(crate) fn record(&mut self, outcome: &SyncOutcome) {
        self.processed += 1;
        self.last_event_at = Some(Utc::now());
        match outcome {
            SyncOutcome::Created { .. } => self.created += 1,
            SyncOutcome::Updated { .. } => self.updated += 1,
            SyncOutcome::Deleted { count } => self.deleted += *count as u64,
            SyncOutcome::AlreadySynced { .. }
            | SyncOutcome::SkippedDuplicate { .. }
            | SyncOutcome::NotFound
            | SyncOutcome::Missing => self.skipped += 1,
        }
    }

    pub(crate) fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
        self.last_event_at = Some(Utc::now());
    }
}

/// Snapshot returned by `get_status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_running: bool,
    pub registers: BTreeMap<Register, RegisterStatus>,
    /// Newest last
    pub recent_errors: Vec<SyncErrorRecord>,
}

impl SyncStatus {
    pub fn register(&self, register: Register) -> RegisterStatus {
        self.registers.get(&register).cloned().unwrap_or_default()
    }

    pub fn total_processed(&self) -> u64 {
        self.registers.values().map(|s| s.processed).sum()
    }
}

/// Mutable status held behind the orchestrator's lock
#[derive(Debug, Default)]
pub(crate) struct StatusBook {
    registers: BTreeMap<Register, RegisterStatus>,
    recent_errors: VecDeque<SyncErrorRecord>,
}

impl StatusBook {
    pub fn register_mut(&mut self, register: Register) -> &mut RegisterStatus {
        self.registers.entry(register).or_default()
    }

    pub fn state(&self, register: Register) -> ListenerState {
        self.registers
            .get(&register)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    pub fn push_error(&mut self, record: SyncErrorRecord) {
        if self.recent_errors.len() == RECENT_ERROR_CAPACITY {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(record);
    }

    pub fn snapshot(&self) -> SyncStatus {
        let registers: BTreeMap<Register, RegisterStatus> = Register::ALL
            .iter()
            .map(|r| (*r, self.registers.get(r).cloned().unwrap_or_default()))
            .collect();
        SyncStatus {
            is_running: registers.values().any(|s| s.attached),
            registers,
            recent_errors: self.recent_errors.iter().cloned().collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
