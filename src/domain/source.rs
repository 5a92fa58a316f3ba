//! Source Records
//!
//! The two registers the ledger mirrors. Records arrive from an external
//! store, so every field a projection needs may be absent; the projection
//! rules decide what is required.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Origin, Register};

/// Tuition payment status as stored in the register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuitionStatus {
    Paid,
    #[default]
    Pending,
    Overdue,
    #[serde(other)]
    Unknown,
}

impl From<&str> for TuitionStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => TuitionStatus::Paid,
            "pending" => TuitionStatus::Pending,
            "overdue" => TuitionStatus::Overdue,
            _ => TuitionStatus::Unknown,
        }
    }
}

/// Payroll entry status as stored in the register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayrollStatus {
    Active,
    #[default]
    Pending,
    Inactive,
    #[serde(other)]
    Unknown,
}

impl From<&str> for PayrollStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => PayrollStatus::Active,
            "pending" => PayrollStatus::Pending,
            "inactive" => PayrollStatus::Inactive,
            _ => PayrollStatus::Unknown,
        }
    }
}

/// A payment received from a student
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TuitionPayment {
    pub id: String,
    pub student_name: String,
    pub amount: Option<Decimal>,
    pub payment_date: Option<NaiveDate>,
    pub payment_method: String,
    pub status: TuitionStatus,
    pub class: String,
    pub period: String,
    pub reference: String,
}

/// A salary payment owed to an employee
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PayrollEntry {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub net_salary: Option<Decimal>,
    pub effective_date: Option<NaiveDate>,
    pub payment_month: Option<u32>,
    pub payment_year: Option<i32>,
    pub position: String,
    pub department: String,
    pub status: PayrollStatus,
}

impl PayrollEntry {
    /// Effective date, or the first day of the payment period
    pub fn resolved_date(&self) -> Option<NaiveDate> {
        self.effective_date.or_else(|| {
            NaiveDate::from_ymd_opt(self.payment_year?, self.payment_month?, 1)
        })
    }

    /// Payment (month, year), falling back to the effective date
    pub fn period(&self) -> Option<(u32, i32)> {
        match (self.payment_month, self.payment_year) {
            (Some(month), Some(year)) => Some((month, year)),
            _ => self.effective_date.map(|d| (d.month(), d.year())),
        }
    }
}

/// Capabilities shared by both source record shapes
pub trait SourceFields {
    fn id(&self) -> &str;
    fn amount(&self) -> Option<Decimal>;
    fn date(&self) -> Option<NaiveDate>;
    /// Whether the record represents money that has actually moved
    fn is_completed(&self) -> bool;
}

impl SourceFields for TuitionPayment {
    fn id(&self) -> &str {
        &self.id
    }

    fn amount(&self) -> Option<Decimal> {
        self.amount
    }

    fn date(&self) -> Option<NaiveDate> {
        self.payment_date
    }

    fn is_completed(&self) -> bool {
        self.status == TuitionStatus::Paid
    }
}

impl SourceFields for PayrollEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn amount(&self) -> Option<Decimal> {
        self.net_salary
    }

    fn date(&self) -> Option<NaiveDate> {
        self.resolved_date()
    }

    fn is_completed(&self) -> bool {
        self.status == PayrollStatus::Active
    }
}

/// A record from either register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "register", rename_all = "snake_case")]
pub enum SourceRecord {
    Tuition(TuitionPayment),
    Payroll(PayrollEntry),
}

impl SourceRecord {
    pub fn register(&self) -> Register {
        match self {
            SourceRecord::Tuition(_) => Register::Tuition,
            SourceRecord::Payroll(_) => Register::Payroll,
        }
    }

    pub fn origin(&self) -> Origin {
        self.register().origin()
    }

    fn fields(&self) -> &dyn SourceFields {
        match self {
            SourceRecord::Tuition(payment) => payment,
            SourceRecord::Payroll(entry) => entry,
        }
    }
}

impl SourceFields for SourceRecord {
    fn id(&self) -> &str {
        self.fields().id()
    }

    fn amount(&self) -> Option<Decimal> {
        self.fields().amount()
    }

    fn date(&self) -> Option<NaiveDate> {
        self.fields().date()
    }

    fn is_completed(&self) -> bool {
        self.fields().is_completed()
    }
}

impl From<TuitionPayment> for SourceRecord {
    fn from(payment: TuitionPayment) -> Self {
        SourceRecord::Tuition(payment)
    }
}

impl From<PayrollEntry> for SourceRecord {
    fn from(entry: PayrollEntry) -> Self {
        SourceRecord::Payroll(entry)
    }
}
