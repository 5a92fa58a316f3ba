//! Domain module
//!
//! Core domain types: source records, ledger entries, and the events that
//! flow between them.

pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod ledger;
pub mod source;

pub use amount::{Amount, AmountError};
pub use context::OperationContext;
pub use error::MappingError;
pub use events::{ChangeEvent, Notification};
pub use ledger::{
    EntryKind, EntryStatus, LedgerEntry, LedgerEntryPatch, NewLedgerEntry, Origin, Register,
    UnknownVariant,
};
pub use source::{
    PayrollEntry, PayrollStatus, SourceFields, SourceRecord, TuitionPayment, TuitionStatus,
};
