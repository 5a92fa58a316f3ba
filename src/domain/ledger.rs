//! Ledger Entry
//!
//! The unified transaction record. Entries of Tuition or Payroll origin are
//! projections of a source record; Manual entries are owned by whoever
//! created them and only read here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Amount;

/// Raised when a stored enum column holds a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {field} value: {value}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

/// Direction of the money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Inflow,
    Outflow,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Inflow => "inflow",
            EntryKind::Outflow => "outflow",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inflow" => Ok(EntryKind::Inflow),
            "outflow" => Ok(EntryKind::Outflow),
            other => Err(UnknownVariant {
                field: "kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Ledger entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Validated,
    Pending,
    Cancelled,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Validated => "validated",
            EntryStatus::Pending => "pending",
            EntryStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validated" => Ok(EntryStatus::Validated),
            "pending" => Ok(EntryStatus::Pending),
            "cancelled" => Ok(EntryStatus::Cancelled),
            other => Err(UnknownVariant {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Where a ledger entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Tuition,
    Payroll,
    Manual,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Tuition => "tuition",
            Origin::Payroll => "payroll",
            Origin::Manual => "manual",
        }
    }

    /// The source register backing this origin, if any
    pub fn register(&self) -> Option<Register> {
        match self {
            Origin::Tuition => Some(Register::Tuition),
            Origin::Payroll => Some(Register::Payroll),
            Origin::Manual => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tuition" => Ok(Origin::Tuition),
            "payroll" => Ok(Origin::Payroll),
            "manual" => Ok(Origin::Manual),
            other => Err(UnknownVariant {
                field: "origin",
                value: other.to_string(),
            }),
        }
    }
}

/// A source register mirrored into the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Register {
    Tuition,
    Payroll,
}

impl Register {
    pub const ALL: [Register; 2] = [Register::Tuition, Register::Payroll];

    pub fn origin(&self) -> Origin {
        match self {
            Register::Tuition => Origin::Tuition,
            Register::Payroll => Origin::Payroll,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.origin().as_str()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub kind: EntryKind,
    pub category: String,
    pub description: String,
    pub amount: Amount,
    pub date: NaiveDate,
    pub payment_method: String,
    pub status: EntryStatus,
    pub reference: String,
    pub origin: Origin,
    pub origin_id: Option<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// True when `origin`/`origin_id` point at this entry
    pub fn is_mapped_to(&self, origin: Origin, origin_id: &str) -> bool {
        self.origin == origin && self.origin_id.as_deref() == Some(origin_id)
    }

    /// Apply a partial update in place and bump `updated_at`
    pub fn apply_patch(&mut self, patch: &LedgerEntryPatch, now: DateTime<Utc>) {
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(payment_method) = &patch.payment_method {
            self.payment_method = payment_method.clone();
        }
        self.updated_at = now;
    }
}

/// A ledger entry before the store assigns its id and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub kind: EntryKind,
    pub category: String,
    pub description: String,
    pub amount: Amount,
    pub date: NaiveDate,
    pub payment_method: String,
    pub status: EntryStatus,
    #[serde(default)]
    pub reference: String,
    pub origin: Origin,
    #[serde(default)]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl NewLedgerEntry {
    /// Materialize into a stored entry
    pub fn into_entry(self, id: Uuid, now: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            kind: self.kind,
            category: self.category,
            description: self.description,
            amount: self.amount,
            date: self.date,
            payment_method: self.payment_method,
            status: self.status,
            reference: self.reference,
            origin: self.origin,
            origin_id: self.origin_id,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a ledger entry. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

impl LedgerEntryPatch {
    /// The fields a source record owns, taken from a fresh projection.
    /// Category, reference and notes stay as they are.
    pub fn source_derived(projection: &NewLedgerEntry) -> Self {
        Self {
            amount: Some(projection.amount),
            date: Some(projection.date),
            status: Some(projection.status),
            description: Some(projection.description.clone()),
            payment_method: Some(projection.payment_method.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.date.is_none()
            && self.status.is_none()
            && self.description.is_none()
            && self.payment_method.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewLedgerEntry {
        NewLedgerEntry {
            kind: EntryKind::Inflow,
            category: "Tuition".to_string(),
            description: "Tuition - Jean (6A)".to_string(),
            amount: Amount::from_integer(500000).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            payment_method: "cash".to_string(),
            status: EntryStatus::Validated,
            reference: "TUI-p1".to_string(),
            origin: Origin::Tuition,
            origin_id: Some("p1".to_string()),
            notes: "paid at the front desk".to_string(),
        }
    }

    #[test]
    fn test_enum_round_trip_strings() {
        for origin in [Origin::Tuition, Origin::Payroll, Origin::Manual] {
            assert_eq!(origin.as_str().parse::<Origin>().unwrap(), origin);
        }
        assert!("refund".parse::<EntryStatus>().is_err());
        assert_eq!(Register::Payroll.origin(), Origin::Payroll);
        assert_eq!(Origin::Manual.register(), None);
    }

    #[test]
    fn test_patch_preserves_annotations() {
        let now = Utc::now();
        let mut entry = sample().into_entry(Uuid::new_v4(), now);

        let mut changed = sample();
        changed.amount = Amount::from_integer(450000).unwrap();
        changed.notes = "ignored".to_string();
        changed.reference = "ignored".to_string();

        let later = now + chrono::Duration::seconds(5);
        entry.apply_patch(&LedgerEntryPatch::source_derived(&changed), later);

        assert_eq!(entry.amount, Amount::from_integer(450000).unwrap());
        assert_eq!(entry.notes, "paid at the front desk");
        assert_eq!(entry.reference, "TUI-p1");
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.updated_at, later);
    }

    #[test]
    fn test_is_mapped_to() {
        let entry = sample().into_entry(Uuid::new_v4(), Utc::now());
        assert!(entry.is_mapped_to(Origin::Tuition, "p1"));
        assert!(!entry.is_mapped_to(Origin::Payroll, "p1"));
        assert!(!entry.is_mapped_to(Origin::Tuition, "p2"));
    }

    #[test]
    fn test_empty_patch() {
        assert!(LedgerEntryPatch::default().is_empty());
        assert!(!LedgerEntryPatch::source_derived(&sample()).is_empty());
    }
}
