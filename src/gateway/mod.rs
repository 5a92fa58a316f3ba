//! Gateway module
//!
//! The persistence seams of the engine: the unified ledger and the two
//! source registers. Both bundled stores implement the same traits so the
//! orchestrator, dedup engine and validator never know which one they run
//! against.

mod error;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{
    ChangeEvent, LedgerEntry, LedgerEntryPatch, NewLedgerEntry, Origin, Register, SourceRecord,
};
use crate::projection::signature;

pub use error::GatewayError;
pub use memory::{MemoryLedger, MemoryRegister};
pub use postgres::{PgLedger, PgRegister};

/// One item of a change feed. An `Err` means the feed itself broke.
pub type FeedItem = Result<ChangeEvent, GatewayError>;

/// Live change feed of a register. Dropping it unsubscribes.
pub type ChangeFeed = mpsc::UnboundedReceiver<FeedItem>;

/// Result of a conditional insert keyed by (origin, origin_id)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was written
    Created(Uuid),
    /// An entry for the same origin pair already existed
    Existing(Uuid),
}

impl InsertOutcome {
    pub fn entry_id(&self) -> Uuid {
        match self {
            InsertOutcome::Created(id) | InsertOutcome::Existing(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, InsertOutcome::Created(_))
    }
}

/// CRUD access to the unified ledger
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn list(&self) -> Result<Vec<LedgerEntry>, GatewayError>;

    async fn get(&self, id: Uuid) -> Result<Option<LedgerEntry>, GatewayError>;

    async fn create(&self, entry: NewLedgerEntry) -> Result<Uuid, GatewayError>;

    /// Fails with `NotFound` when the entry does not exist
    async fn update(&self, id: Uuid, patch: LedgerEntryPatch) -> Result<(), GatewayError>;

    /// Returns false when the entry was already gone
    async fn delete(&self, id: Uuid) -> Result<bool, GatewayError>;

    /// First entry mapped to the origin pair, oldest first
    async fn find_by_origin(
        &self,
        origin: Origin,
        origin_id: &str,
    ) -> Result<Option<LedgerEntry>, GatewayError> {
        let mut matches: Vec<LedgerEntry> = self
            .list()
            .await?
            .into_iter()
            .filter(|entry| entry.is_mapped_to(origin, origin_id))
            .collect();
        matches.sort_by_key(|entry| entry.created_at);
        Ok(matches.into_iter().next())
    }

    /// Any entry carrying the given signature
    async fn find_by_signature(&self, sig: &str) -> Result<Option<LedgerEntry>, GatewayError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|entry| signature(entry) == sig))
    }

    /// Create unless an entry for the same (origin, origin_id) exists.
    ///
    /// This default is check-then-create and can race; stores that can
    /// express a conditional write override it.
    async fn insert_for_origin(&self, entry: NewLedgerEntry) -> Result<InsertOutcome, GatewayError> {
        if entry.origin != Origin::Manual {
            if let Some(origin_id) = entry.origin_id.as_deref() {
                if let Some(existing) = self.find_by_origin(entry.origin, origin_id).await? {
                    return Ok(InsertOutcome::Existing(existing.id));
                }
            }
        }
        self.create(entry).await.map(InsertOutcome::Created)
    }
}

/// Read access and change feed of one source register
#[async_trait]
pub trait SourceRegister: Send + Sync {
    fn register(&self) -> Register;

    async fn list(&self) -> Result<Vec<SourceRecord>, GatewayError>;

    async fn get(&self, id: &str) -> Result<Option<SourceRecord>, GatewayError>;

    /// Start receiving change events
    async fn subscribe(&self) -> Result<ChangeFeed, GatewayError>;
}

/// The two registers mirrored into the ledger
#[derive(Clone)]
pub struct SourceRegisters {
    tuition: Arc<dyn SourceRegister>,
    payroll: Arc<dyn SourceRegister>,
}

impl SourceRegisters {
    pub fn new(tuition: Arc<dyn SourceRegister>, payroll: Arc<dyn SourceRegister>) -> Self {
        Self { tuition, payroll }
    }

    pub fn get(&self, register: Register) -> &Arc<dyn SourceRegister> {
        match register {
            Register::Tuition => &self.tuition,
            Register::Payroll => &self.payroll,
        }
    }
}
