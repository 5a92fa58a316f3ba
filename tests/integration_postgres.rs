//! Postgres Gateway Integration Tests
//!
//! Skipped unless DATABASE_URL points at a migrated database. Everything
//! runs in one test so the table truncation cannot race.

use std::sync::Arc;

use rust_decimal_macros::dec;
use sqlx::PgPool;

use ledger_reconcile::domain::{Origin, Register};
use ledger_reconcile::gateway::{
    InsertOutcome, LedgerGateway, PgLedger, PgRegister, SourceRegister, SourceRegisters,
};
use ledger_reconcile::projection::project_tuition;
use ledger_reconcile::{ReconcileService, ServiceSettings};

mod common;

use common::{eventually, manual_entry, paid_tuition};

async fn insert_tuition(pool: &PgPool, id: &str, amount: rust_decimal::Decimal, status: &str) {
    sqlx::query(
        r#"
        INSERT INTO tuition_payments (id, student_name, amount, payment_date, payment_method, status, class)
        VALUES ($1, $2, $3, DATE '2024-05-01', 'cash', $4, '6A')
        "#,
    )
    .bind(id)
    .bind(format!("Student {id}"))
    .bind(amount)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_postgres_gateways() {
    let Some(pool) = common::setup_test_db().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    // ---- ledger gateway ----
    let ledger = PgLedger::new(pool.clone());

    let id = ledger.create(manual_entry("Chalk", 1_500)).await.unwrap();
    let stored = ledger.get(id).await.unwrap().unwrap();
    assert_eq!(stored.origin, Origin::Manual);
    assert_eq!(
        ledger
            .find_by_signature(&ledger_reconcile::projection::signature(&stored))
            .await
            .unwrap()
            .map(|e| e.id),
        Some(id)
    );

    let projection = project_tuition(&paid_tuition("t-1", "Jean", dec!(500000))).unwrap();
    let first = ledger.insert_for_origin(projection.clone()).await.unwrap();
    let second = ledger.insert_for_origin(projection).await.unwrap();
    assert!(matches!(first, InsertOutcome::Created(_)));
    assert_eq!(second, InsertOutcome::Existing(first.entry_id()));
    assert_eq!(
        ledger
            .find_by_origin(Origin::Tuition, "t-1")
            .await
            .unwrap()
            .map(|e| e.id),
        Some(first.entry_id())
    );

    assert!(ledger.delete(first.entry_id()).await.unwrap());
    assert!(!ledger.delete(first.entry_id()).await.unwrap());

    // ---- registers and live sync ----
    sqlx::query("TRUNCATE TABLE ledger_entries")
        .execute(&pool)
        .await
        .unwrap();
    insert_tuition(&pool, "t-10", dec!(250000), "paid").await;

    let tuition = PgRegister::new(pool.clone(), Register::Tuition);
    let records = tuition.list().await.unwrap();
    assert_eq!(records.len(), 1);

    let ledger = Arc::new(PgLedger::new(pool.clone()));
    let service = ReconcileService::new(
        ledger.clone(),
        SourceRegisters::new(
            Arc::new(tuition),
            Arc::new(PgRegister::new(pool.clone(), Register::Payroll)),
        ),
        ServiceSettings::default(),
    );

    let report = service.initialize_sync().await;
    assert_eq!(report.total_created, 1);

    insert_tuition(&pool, "t-11", dec!(300000), "paid").await;
    let created = eventually(|| {
        let ledger = ledger.clone();
        async move {
            ledger
                .find_by_origin(Origin::Tuition, "t-11")
                .await
                .ok()
                .flatten()
                .is_some()
        }
    })
    .await;
    assert!(created, "listener never mirrored the insert");

    sqlx::query("DELETE FROM tuition_payments WHERE id = 't-10'")
        .execute(&pool)
        .await
        .unwrap();
    let removed = eventually(|| {
        let ledger = ledger.clone();
        async move {
            ledger
                .find_by_origin(Origin::Tuition, "t-10")
                .await
                .ok()
                .flatten()
                .is_none()
        }
    })
    .await;
    assert!(removed, "listener never mirrored the delete");

    let validation = service.validate().await.unwrap();
    assert!(validation.is_consistent, "issues: {:?}", validation.issues);

    service.close().await;
}
