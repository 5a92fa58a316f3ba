//! Duplicate-detection signature
//!
//! Two entries describe the same economic event when kind, category,
//! description, whole-unit amount, date and payment method all agree.
//! Origin metadata is deliberately left out so a manual re-entry of a
//! synced payment is caught as well.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::domain::{Amount, EntryKind, LedgerEntry, NewLedgerEntry};

const SEPARATOR: char = '|';

/// Anything carrying the semantic fields of a ledger entry
pub trait Signed {
    fn kind(&self) -> EntryKind;
    fn category(&self) -> &str;
    fn description(&self) -> &str;
    fn amount(&self) -> Amount;
    fn date(&self) -> NaiveDate;
    fn payment_method(&self) -> &str;
}

impl Signed for LedgerEntry {
    fn kind(&self) -> EntryKind {
        self.kind
    }
    fn category(&self) -> &str {
        &self.category
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn amount(&self) -> Amount {
        self.amount
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn payment_method(&self) -> &str {
        &self.payment_method
    }
}

impl Signed for NewLedgerEntry {
    fn kind(&self) -> EntryKind {
        self.kind
    }
    fn category(&self) -> &str {
        &self.category
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn amount(&self) -> Amount {
        self.amount
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn payment_method(&self) -> &str {
        &self.payment_method
    }
}

/// Build the signature string of an entry
pub fn signature<E: Signed + ?Sized>(entry: &E) -> String {
    let parts = [
        entry.kind().as_str().to_string(),
        entry.category().trim().to_string(),
        entry.description().trim().to_string(),
        entry.amount().rounded().to_string(),
        entry.date().format("%Y-%m-%d").to_string(),
        entry.payment_method().trim().to_string(),
    ];
    parts.join(&SEPARATOR.to_string())
}

/// SHA-256 hex digest of the signature, for indexed storage
pub fn signature_digest<E: Signed + ?Sized>(entry: &E) -> String {
    digest_of(&signature(entry))
}

/// SHA-256 hex digest of an already-built signature
pub fn digest_of(sig: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sig.as_bytes());
    hex::encode(hasher.finalize())
}
