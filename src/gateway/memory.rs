//! In-memory stores
//!
//! Process-local ledger and registers. Used by tests and demos, and as the
//! reference behaviour for the Postgres stores: the ledger's conditional
//! insert is atomic, and each register fans out change events to every
//! live subscriber.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{
    ChangeEvent, LedgerEntry, LedgerEntryPatch, NewLedgerEntry, Origin, Register, SourceFields,
    SourceRecord,
};

use super::{ChangeFeed, FeedItem, GatewayError, InsertOutcome, LedgerGateway, SourceRegister};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =========================================================================
// Ledger
// =========================================================================

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    failing_deletes: HashSet<Uuid>,
    failing_list: Option<String>,
}

/// In-memory unified ledger
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry exactly as given, timestamps included
    pub fn insert_raw(&self, entry: LedgerEntry) {
        lock(&self.state).entries.push(entry);
    }

    /// Snapshot of all entries in insertion order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        lock(&self.state).entries.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every delete of `id` fail until cleared
    pub fn fail_deletes_of(&self, id: Uuid) {
        lock(&self.state).failing_deletes.insert(id);
    }

    /// Make `list` fail until cleared
    pub fn fail_lists(&self, message: &str) {
        lock(&self.state).failing_list = Some(message.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.failing_deletes.clear();
        state.failing_list = None;
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn list(&self) -> Result<Vec<LedgerEntry>, GatewayError> {
        let state = lock(&self.state);
        match &state.failing_list {
            Some(message) => Err(GatewayError::Unavailable(message.clone())),
            None => Ok(state.entries.clone()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<LedgerEntry>, GatewayError> {
        Ok(lock(&self.state)
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .cloned())
    }

    async fn create(&self, entry: NewLedgerEntry) -> Result<Uuid, GatewayError> {
        let id = Uuid::new_v4();
        lock(&self.state)
            .entries
            .push(entry.into_entry(id, Utc::now()));
        Ok(id)
    }

    async fn update(&self, id: Uuid, patch: LedgerEntryPatch) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        let entry = state
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(GatewayError::NotFound(id))?;
        entry.apply_patch(&patch, Utc::now());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, GatewayError> {
        let mut state = lock(&self.state);
        if state.failing_deletes.contains(&id) {
            return Err(GatewayError::Unavailable(format!("delete of {id} rejected")));
        }
        let before = state.entries.len();
        state.entries.retain(|entry| entry.id != id);
        Ok(state.entries.len() < before)
    }

    async fn insert_for_origin(&self, entry: NewLedgerEntry) -> Result<InsertOutcome, GatewayError> {
        let mut state = lock(&self.state);

        if entry.origin != Origin::Manual {
            if let Some(origin_id) = entry.origin_id.as_deref() {
                if let Some(existing) = state
                    .entries
                    .iter()
                    .find(|stored| stored.is_mapped_to(entry.origin, origin_id))
                {
                    return Ok(InsertOutcome::Existing(existing.id));
                }
            }
        }

        let id = Uuid::new_v4();
        state.entries.push(entry.into_entry(id, Utc::now()));
        Ok(InsertOutcome::Created(id))
    }
}

// =========================================================================
// Registers
// =========================================================================

#[derive(Debug, Default)]
struct RegisterState {
    records: BTreeMap<String, SourceRecord>,
    subscribers: Vec<mpsc::UnboundedSender<FeedItem>>,
    reject_subscriptions: Option<String>,
}

impl RegisterState {
    fn publish(&mut self, item: FeedItem) {
        match item {
            Ok(event) => self
                .subscribers
                .retain(|tx| tx.send(Ok(event.clone())).is_ok()),
            Err(err) => {
                let message = err.to_string();
                for tx in self.subscribers.drain(..) {
                    let _ = tx.send(Err(GatewayError::Feed(message.clone())));
                }
            }
        }
    }
}

/// In-memory source register with a live change feed
#[derive(Debug, Clone)]
pub struct MemoryRegister {
    register: Register,
    state: Arc<Mutex<RegisterState>>,
}

impl MemoryRegister {
    pub fn new(register: Register) -> Self {
        Self {
            register,
            state: Arc::new(Mutex::new(RegisterState::default())),
        }
    }

    pub fn tuition() -> Self {
        Self::new(Register::Tuition)
    }

    pub fn payroll() -> Self {
        Self::new(Register::Payroll)
    }

    /// Create or replace a record, emitting Added or Modified.
    /// Records of the other register are ignored.
    pub fn upsert(&self, record: impl Into<SourceRecord>) -> Option<ChangeEvent> {
        let record = record.into();
        if record.register() != self.register {
            tracing::warn!(
                register = %self.register,
                record_register = %record.register(),
                "Ignoring record written to the wrong register"
            );
            return None;
        }

        let mut state = lock(&self.state);
        let id = record.id().to_string();
        let event = if state.records.insert(id, record.clone()).is_some() {
            ChangeEvent::Modified(record)
        } else {
            ChangeEvent::Added(record)
        };
        state.publish(Ok(event.clone()));
        Some(event)
    }

    /// Store a record without notifying subscribers
    pub fn seed(&self, record: impl Into<SourceRecord>) {
        let record = record.into();
        if record.register() == self.register {
            lock(&self.state)
                .records
                .insert(record.id().to_string(), record);
        }
    }

    /// Delete a record, emitting Removed when it existed
    pub fn remove(&self, id: &str) -> bool {
        let mut state = lock(&self.state);
        let existed = state.records.remove(id).is_some();
        if existed {
            state.publish(Ok(ChangeEvent::Removed(id.to_string())));
        }
        existed
    }

    /// Push an arbitrary event to subscribers (at-least-once redelivery)
    pub fn redeliver(&self, event: ChangeEvent) {
        lock(&self.state).publish(Ok(event));
    }

    /// Fail every live feed and drop the subscriptions
    pub fn break_feeds(&self, message: &str) {
        lock(&self.state).publish(Err(GatewayError::Feed(message.to_string())));
    }

    /// Make future `subscribe` calls fail (`None` restores them)
    pub fn reject_subscriptions(&self, message: Option<&str>) {
        lock(&self.state).reject_subscriptions = message.map(str::to_string);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

#[async_trait]
impl SourceRegister for MemoryRegister {
    fn register(&self) -> Register {
        self.register
    }

    async fn list(&self) -> Result<Vec<SourceRecord>, GatewayError> {
        Ok(lock(&self.state).records.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<SourceRecord>, GatewayError> {
        Ok(lock(&self.state).records.get(id).cloned())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, GatewayError> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.reject_subscriptions {
            return Err(GatewayError::Feed(message.clone()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        Ok(rx)
    }
}
