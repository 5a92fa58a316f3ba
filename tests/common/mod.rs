//! Common test utilities

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use ledger_reconcile::domain::{
    Amount, EntryKind, EntryStatus, LedgerEntry, NewLedgerEntry, Origin, PayrollEntry,
    PayrollStatus, TuitionPayment, TuitionStatus,
};
use ledger_reconcile::gateway::{MemoryLedger, MemoryRegister, SourceRegisters};
use ledger_reconcile::{ReconcileService, ServiceSettings};

/// A service wired to in-memory stores, with handles on every store
pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub tuition: Arc<MemoryRegister>,
    pub payroll: Arc<MemoryRegister>,
    pub service: Arc<ReconcileService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ServiceSettings::default())
    }

    pub fn with_settings(settings: ServiceSettings) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let tuition = Arc::new(MemoryRegister::tuition());
        let payroll = Arc::new(MemoryRegister::payroll());
        let service = Arc::new(ReconcileService::new(
            ledger.clone(),
            SourceRegisters::new(tuition.clone(), payroll.clone()),
            settings,
        ));
        Self {
            ledger,
            tuition,
            payroll,
            service,
        }
    }

    /// Entries mapped to one source record
    pub fn entries_for(&self, origin: Origin, origin_id: &str) -> Vec<LedgerEntry> {
        self.ledger
            .entries()
            .into_iter()
            .filter(|e| e.is_mapped_to(origin, origin_id))
            .collect()
    }
}

// =========================================================================
// Fixtures
// =========================================================================

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn paid_tuition(id: &str, student: &str, amount: Decimal) -> TuitionPayment {
    TuitionPayment {
        id: id.to_string(),
        student_name: student.to_string(),
        amount: Some(amount),
        payment_date: Some(date(2024, 5, 1)),
        payment_method: "cash".to_string(),
        status: TuitionStatus::Paid,
        class: "6A".to_string(),
        ..Default::default()
    }
}

pub fn active_salary(id: &str, employee: &str, amount: Decimal) -> PayrollEntry {
    PayrollEntry {
        id: id.to_string(),
        employee_id: format!("emp-{id}"),
        employee_name: employee.to_string(),
        net_salary: Some(amount),
        effective_date: Some(date(2024, 5, 31)),
        payment_month: Some(5),
        payment_year: Some(2024),
        position: "Teacher".to_string(),
        department: "Sciences".to_string(),
        status: PayrollStatus::Active,
    }
}

pub fn manual_entry(description: &str, amount: i64) -> NewLedgerEntry {
    NewLedgerEntry {
        kind: EntryKind::Outflow,
        category: "Supplies".to_string(),
        description: description.to_string(),
        amount: Amount::from_integer(amount).unwrap(),
        date: date(2024, 5, 2),
        payment_method: "cash".to_string(),
        status: EntryStatus::Validated,
        reference: String::new(),
        origin: Origin::Manual,
        origin_id: None,
        notes: String::new(),
    }
}

/// Persisted form of `entry` with a chosen creation time
pub fn stored(entry: NewLedgerEntry, created_at: DateTime<Utc>) -> LedgerEntry {
    entry.into_entry(Uuid::new_v4(), created_at)
}

/// Poll until `check` holds; listeners apply events asynchronously
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// =========================================================================
// Postgres
// =========================================================================

/// Connect and truncate, or `None` when DATABASE_URL is not set
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query("TRUNCATE TABLE ledger_entries, tuition_payments, payroll_entries")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    Some(pool)
}
