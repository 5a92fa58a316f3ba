//! Dedup Integration Tests
//!
//! Signature collapse, prevent-on-create, and the periodic scheduler.

use std::time::Duration;

use chrono::Utc;
use ledger_reconcile::domain::Notification;
use ledger_reconcile::jobs::{SchedulerConfig, SchedulerConfigPatch};
use rust_decimal_macros::dec;
use tokio::sync::broadcast;

mod common;

use common::{eventually, manual_entry, paid_tuition, stored, Harness};

fn seed_pair(h: &Harness, description: &str) -> uuid::Uuid {
    let older = stored(manual_entry(description, 1200), Utc::now() - chrono::Duration::hours(2));
    let newer = stored(manual_entry(description, 1200), Utc::now() - chrono::Duration::hours(1));
    let newer_id = newer.id;
    h.ledger.insert_raw(older);
    h.ledger.insert_raw(newer);
    newer_id
}

async fn next_of_type(rx: &mut broadcast::Receiver<Notification>, kind: &str) -> Notification {
    loop {
        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notification channel closed");
        if notification.event_type() == kind {
            return notification;
        }
    }
}

#[tokio::test]
async fn test_remove_keeps_later_created() {
    let h = Harness::new();
    let newer_id = seed_pair(&h, "Chalk boxes");

    let report = h.service.remove_duplicates().await.unwrap();

    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.kept, 1);
    let remaining = h.ledger.entries();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, newer_id);

    let analysis = h.service.analyze_duplicates().await.unwrap();
    assert!(!analysis.has_duplicates());
}

#[tokio::test]
async fn test_duplicates_across_origins() {
    let h = Harness::new();
    let sync = h.service.orchestrator();
    let payment = paid_tuition("p1", "Jean", dec!(500000));
    sync.on_record_added(payment.clone().into()).await.unwrap();

    // the same payment typed in by hand, one day later
    let mut manual = ledger_reconcile::projection::project_tuition(&payment).unwrap();
    manual.origin = ledger_reconcile::Origin::Manual;
    manual.origin_id = None;
    manual.reference = "hand-typed".to_string();
    let typed = stored(manual, Utc::now() + chrono::Duration::days(1));
    let typed_id = typed.id;
    h.ledger.insert_raw(typed);

    let analysis = h.service.analyze_duplicates().await.unwrap();
    assert_eq!(analysis.total_entries, 2);
    assert_eq!(analysis.duplicate_groups.len(), 1);
    assert_eq!(analysis.duplicate_groups[0].entry_ids[0], typed_id);
    assert_eq!(analysis.duplicate_groups[0].sample_description, "Tuition - Jean (6A)");
}

#[tokio::test]
async fn test_prevent_on_create() {
    let h = Harness::new();
    let existing = h.service.create_manual_entry(manual_entry("Ink", 300)).await.unwrap();
    assert!(existing.created);

    let check = h
        .service
        .dedup()
        .prevent_on_create(&manual_entry("Ink", 300))
        .await
        .unwrap();
    assert!(!check.allowed);
    assert_eq!(check.existing_id, Some(existing.entry_id));

    let check = h
        .service
        .dedup()
        .prevent_on_create(&manual_entry("Ink", 301))
        .await
        .unwrap();
    assert!(check.allowed);
    assert!(check.existing_id.is_none());
}

#[tokio::test]
async fn test_scheduler_runs_immediately_and_alerts() {
    let h = Harness::new();
    seed_pair(&h, "Chalk boxes");
    seed_pair(&h, "Paper reams");
    let mut rx = h.service.notifier().subscribe();

    let started = h
        .service
        .start_scheduler(Some(SchedulerConfig {
            enabled: true,
            interval_ms: 60_000,
            alert_threshold: 1,
            silent: false,
        }))
        .await;
    assert!(started);

    match next_of_type(&mut rx, "DuplicateAlert").await {
        Notification::DuplicateAlert { duplicates, threshold, .. } => {
            assert_eq!(duplicates, 2);
            assert_eq!(threshold, 1);
        }
        other => panic!("unexpected notification: {other:?}"),
    }
    match next_of_type(&mut rx, "DeduplicationCompleted").await {
        Notification::DeduplicationCompleted { removed, kept, errors, .. } => {
            assert_eq!(removed, 2);
            assert_eq!(kept, 2);
            assert_eq!(errors, 0);
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    assert!(h.service.scheduler().is_running().await);
    h.service.stop_scheduler().await;
    assert!(!h.service.scheduler().is_running().await);
    assert_eq!(h.ledger.len(), 2);
}

#[tokio::test]
async fn test_silent_cycle_skips_alert() {
    let h = Harness::new();
    seed_pair(&h, "Chalk boxes");
    h.service
        .update_scheduler_config(SchedulerConfigPatch {
            alert_threshold: Some(0),
            silent: Some(true),
            ..Default::default()
        })
        .await;

    let report = h.service.force_check().await.unwrap();

    assert_eq!(report.duplicates_found, 1);
    assert!(!report.alerted);
    assert_eq!(report.removal.duplicates_removed, 1);
}

#[tokio::test]
async fn test_force_check_ignores_enabled_flag() {
    let h = Harness::new();
    seed_pair(&h, "Chalk boxes");

    let config = h
        .service
        .update_scheduler_config(SchedulerConfigPatch {
            enabled: Some(false),
            ..Default::default()
        })
        .await;
    assert!(!config.enabled);
    assert!(!h.service.start_scheduler(None).await);

    let report = h.service.force_check().await.unwrap();
    assert_eq!(report.removal.duplicates_removed, 1);
}

#[tokio::test]
async fn test_update_config_restarts_running_scheduler() {
    let h = Harness::new();
    h.service
        .start_scheduler(Some(SchedulerConfig {
            interval_ms: 60_000,
            ..Default::default()
        }))
        .await;

    // a short interval picks up duplicates inserted after start
    let config = h
        .service
        .update_scheduler_config(SchedulerConfigPatch {
            interval_ms: Some(20),
            ..Default::default()
        })
        .await;
    assert_eq!(config.interval_ms, 20);
    assert!(h.service.scheduler().is_running().await);

    seed_pair(&h, "Chalk boxes");
    assert!(eventually(|| async { h.ledger.len() == 1 }).await);

    // disabling stops it
    h.service
        .update_scheduler_config(SchedulerConfigPatch {
            enabled: Some(false),
            ..Default::default()
        })
        .await;
    assert!(!h.service.scheduler().is_running().await);
}
