//! Consistency Integration Tests
//!
//! Validation, repair, convergence and the combined health check.

use chrono::Utc;
use ledger_reconcile::domain::{Origin, Register, TuitionStatus};
use ledger_reconcile::projection::{project_payroll, project_tuition};
use ledger_reconcile::validation::InvariantViolation;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod common;

use common::{active_salary, paid_tuition, stored, Harness};

fn seed_paid_tuition(h: &Harness, count: usize) {
    for i in 0..count {
        h.tuition.seed(paid_tuition(
            &format!("p{i}"),
            &format!("Student {i}"),
            Decimal::from(100_000 + i as i64),
        ));
    }
}

#[tokio::test]
async fn test_missing_entries_reported_then_repaired() {
    let h = Harness::new();
    seed_paid_tuition(&h, 5);
    for i in 0..3 {
        let record = paid_tuition(&format!("p{i}"), &format!("Student {i}"), Decimal::from(100_000 + i));
        h.ledger.insert_raw(stored(project_tuition(&record).unwrap(), Utc::now()));
    }

    let report = h.service.validate().await.unwrap();
    assert!(!report.is_consistent);
    assert_eq!(report.missing(Register::Tuition), 2);
    assert_eq!(report.missing(Register::Payroll), 0);
    assert_eq!(report.orphan_count, 0);

    let repair = h.service.repair().await.unwrap();
    assert_eq!(repair.created(Register::Tuition), 2);
    assert!(repair.errors.is_empty());

    let report = h.service.validate().await.unwrap();
    assert!(report.is_consistent);
    assert_eq!(report.missing(Register::Tuition), 0);
}

#[tokio::test]
async fn test_pending_records_are_not_missing() {
    let h = Harness::new();
    let mut pending = paid_tuition("p1", "Jean", dec!(1000));
    pending.status = TuitionStatus::Overdue;
    h.tuition.seed(pending);

    let report = h.service.validate().await.unwrap();
    assert!(report.is_consistent);
}

#[tokio::test]
async fn test_orphan_detected_and_removed() {
    let h = Harness::new();
    let mut orphan = project_payroll(&active_salary("e9", "Ghost", dec!(90000))).unwrap();
    orphan.origin_id = Some("e9".to_string());
    h.ledger.insert_raw(stored(orphan, Utc::now()));

    let report = h.service.validate().await.unwrap();
    assert_eq!(report.orphan_count, 1);
    assert!(matches!(
        &report.issues[0],
        InvariantViolation::OrphanEntry { origin: Origin::Payroll, origin_id: Some(id), .. } if id == "e9"
    ));

    let repair = h.service.repair().await.unwrap();
    assert_eq!(repair.orphans_removed, 1);

    let report = h.service.validate().await.unwrap();
    assert_eq!(report.orphan_count, 0);
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_repair_twice_converges() {
    let h = Harness::new();
    seed_paid_tuition(&h, 4);
    h.payroll.seed(active_salary("e1", "Awa", dec!(250000)));
    let orphan = project_payroll(&active_salary("gone", "Left", dec!(1000))).unwrap();
    h.ledger.insert_raw(stored(orphan, Utc::now()));

    let first = h.service.repair().await.unwrap();
    assert_eq!(first.created(Register::Tuition), 4);
    assert_eq!(first.created(Register::Payroll), 1);
    assert_eq!(first.orphans_removed, 1);

    let second = h.service.repair().await.unwrap();
    assert_eq!(second.total_changes(), 0);
    assert!(second.errors.is_empty());
    assert_eq!(h.ledger.len(), 5);
}

#[tokio::test]
async fn test_duplicate_origin_collapsed_keeping_newest() {
    let h = Harness::new();
    let record = paid_tuition("p1", "Jean", dec!(500000));
    h.tuition.seed(record.clone());
    let projection = project_tuition(&record).unwrap();
    let older = stored(projection.clone(), Utc::now() - chrono::Duration::minutes(5));
    let newer = stored(projection, Utc::now());
    let newer_id = newer.id;
    h.ledger.insert_raw(older);
    h.ledger.insert_raw(newer);

    let report = h.service.validate().await.unwrap();
    assert_eq!(report.duplicate_origin_count, 1);

    let repair = h.service.repair().await.unwrap();
    assert_eq!(repair.duplicates_removed, 1);
    let entries = h.entries_for(Origin::Tuition, "p1");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, newer_id);
}

#[tokio::test]
async fn test_manual_twin_covers_record() {
    let h = Harness::new();
    let record = paid_tuition("p1", "Jean", dec!(500000));
    h.tuition.seed(record.clone());

    let mut typed = project_tuition(&record).unwrap();
    typed.origin = Origin::Manual;
    typed.origin_id = None;
    h.service.create_manual_entry(typed).await.unwrap();

    let report = h.service.validate().await.unwrap();
    assert!(report.is_consistent);

    // the sync path refuses the record for the same reason
    let report = h.service.sync_all_existing_data().await;
    assert_eq!(report.total_created, 0);
    assert_eq!(h.ledger.len(), 1);
}

#[tokio::test]
async fn test_repair_reports_unprojectable_record() {
    let h = Harness::new();
    let mut broken = paid_tuition("p1", "Jean", dec!(1));
    broken.payment_date = None;
    h.tuition.seed(broken);

    let report = h.service.validate().await.unwrap();
    assert_eq!(report.missing(Register::Tuition), 1);

    let repair = h.service.repair().await.unwrap();
    assert_eq!(repair.total_changes(), 0);
    assert_eq!(repair.errors.len(), 1);
    assert!(repair.errors[0].message.contains("paymentDate"));
}

#[tokio::test]
async fn test_health_check_recommends_fixes() {
    let h = Harness::new();
    seed_paid_tuition(&h, 2);
    h.service.initialize_sync().await;
    h.tuition.seed(paid_tuition("late", "Late Student", dec!(3000)));

    let health = h.service.health_check().await.unwrap();
    assert!(!health.is_healthy);
    assert_eq!(health.validation.missing(Register::Tuition), 1);
    assert!(health
        .recommendations
        .iter()
        .any(|r| r.contains("repair")));

    h.service.repair().await.unwrap();
    let health = h.service.health_check().await.unwrap();
    assert!(health.is_healthy, "issues: {:?}", health.issues);

    h.service.close().await;
}
