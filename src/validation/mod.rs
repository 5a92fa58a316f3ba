//! Consistency Validator & Repairer
//!
//! Full-scan comparison of both registers against the ledger. Violations
//! are reported as data, never raised; `repair` fixes them through the
//! same idempotent create path the listeners use.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::dedup::newest_first;
use crate::domain::{LedgerEntry, Origin, Register, SourceFields, SourceRecord};
use crate::gateway::{GatewayError, LedgerGateway, SourceRegisters};
use crate::projection::{project, signature};
use crate::sync::{SyncOrchestrator, SyncOutcome};

// =========================================================================
// Reports
// =========================================================================

/// A broken ledger invariant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// A completed source record with no entry
    MissingEntry { register: Register, origin_id: String },

    /// A sourced entry whose record no longer exists
    OrphanEntry {
        entry_id: Uuid,
        origin: Origin,
        origin_id: Option<String>,
    },

    /// Several entries mapped to one source record
    DuplicateOrigin {
        origin: Origin,
        origin_id: String,
        entry_ids: Vec<Uuid>,
    },
}

impl InvariantViolation {
    pub fn describe(&self) -> String {
        match self {
            Self::MissingEntry { register, origin_id } => {
                format!("{register} record {origin_id} has no ledger entry")
            }
            Self::OrphanEntry { entry_id, origin, origin_id } => match origin_id {
                Some(id) => format!("entry {entry_id} references missing {origin} record {id}"),
                None => format!("entry {entry_id} of origin {origin} has no origin id"),
            },
            Self::DuplicateOrigin { origin, origin_id, entry_ids } => format!(
                "{} entries are mapped to {origin} record {origin_id}",
                entry_ids.len()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub is_consistent: bool,
    pub missing_by_origin: BTreeMap<Register, usize>,
    pub orphan_count: usize,
    pub duplicate_origin_count: usize,
    pub records_checked: usize,
    pub entries_checked: usize,
    pub issues: Vec<InvariantViolation>,
}

impl ValidationReport {
    pub fn missing(&self, register: Register) -> usize {
        self.missing_by_origin.get(&register).copied().unwrap_or(0)
    }

    pub fn total_missing(&self) -> usize {
        self.missing_by_origin.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairFailure {
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
    pub created_by_origin: BTreeMap<Register, usize>,
    pub orphans_removed: usize,
    pub duplicates_removed: usize,
    pub errors: Vec<RepairFailure>,
}

impl RepairReport {
    pub fn created(&self, register: Register) -> usize {
        self.created_by_origin.get(&register).copied().unwrap_or(0)
    }

    pub fn total_changes(&self) -> usize {
        self.created_by_origin.values().sum::<usize>()
            + self.orphans_removed
            + self.duplicates_removed
    }
}

// =========================================================================
// Scan
// =========================================================================

/// Everything a scan found, with what repair needs to act on it
struct Scan {
    report: ValidationReport,
    missing: Vec<SourceRecord>,
    orphans: Vec<Uuid>,
    duplicate_groups: Vec<Vec<LedgerEntry>>,
}

fn scan(records: Vec<SourceRecord>, entries: Vec<LedgerEntry>) -> Scan {
    let records_checked = records.len();
    let entries_checked = entries.len();

    let record_ids: HashSet<(Register, String)> = records
        .iter()
        .map(|r| (r.register(), r.id().to_string()))
        .collect();
    let signatures: HashSet<String> = entries.iter().map(signature).collect();

    let mut by_origin: HashMap<(Origin, String), Vec<LedgerEntry>> = HashMap::new();
    let mut issues = Vec::new();
    let mut orphans = Vec::new();

    for entry in entries {
        let Some(register) = entry.origin.register() else {
            continue;
        };
        let origin_id = entry
            .origin_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match origin_id {
            Some(id) if record_ids.contains(&(register, id.to_string())) => {
                by_origin
                    .entry((entry.origin, id.to_string()))
                    .or_default()
                    .push(entry);
            }
            _ => {
                issues.push(InvariantViolation::OrphanEntry {
                    entry_id: entry.id,
                    origin: entry.origin,
                    origin_id: entry.origin_id.clone(),
                });
                orphans.push(entry.id);
            }
        }
    }

    let mut missing_by_origin: BTreeMap<Register, usize> =
        Register::ALL.iter().map(|r| (*r, 0)).collect();
    let mut missing = Vec::new();

    for record in records {
        if !record.is_completed() {
            continue;
        }
        if by_origin.contains_key(&(record.origin(), record.id().to_string())) {
            continue;
        }
        // same economic event already in the ledger under another origin
        if let Ok(projection) = project(&record) {
            if signatures.contains(&signature(&projection)) {
                continue;
            }
        }

        *missing_by_origin.entry(record.register()).or_default() += 1;
        issues.push(InvariantViolation::MissingEntry {
            register: record.register(),
            origin_id: record.id().to_string(),
        });
        missing.push(record);
    }

    let mut duplicate_groups: Vec<Vec<LedgerEntry>> = by_origin
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(_, mut group)| {
            group.sort_by(newest_first);
            group
        })
        .collect();
    duplicate_groups.sort_by(|a, b| a[0].created_at.cmp(&b[0].created_at));

    for group in &duplicate_groups {
        issues.push(InvariantViolation::DuplicateOrigin {
            origin: group[0].origin,
            origin_id: group[0].origin_id.clone().unwrap_or_default(),
            entry_ids: group.iter().map(|e| e.id).collect(),
        });
    }

    let report = ValidationReport {
        is_consistent: issues.is_empty(),
        missing_by_origin,
        orphan_count: orphans.len(),
        duplicate_origin_count: duplicate_groups.len(),
        records_checked,
        entries_checked,
        issues,
    };

    Scan {
        report,
        missing,
        orphans,
        duplicate_groups,
    }
}

// =========================================================================
// Validator
// =========================================================================

#[derive(Clone)]
pub struct ConsistencyValidator {
    ledger: Arc<dyn LedgerGateway>,
    registers: SourceRegisters,
    orchestrator: SyncOrchestrator,
}

impl ConsistencyValidator {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        registers: SourceRegisters,
        orchestrator: SyncOrchestrator,
    ) -> Self {
        Self {
            ledger,
            registers,
            orchestrator,
        }
    }

    /// Read both sides and report every violation
    pub async fn validate(&self) -> Result<ValidationReport, GatewayError> {
        let report = self.scan().await?.report;

        if report.is_consistent {
            tracing::debug!(
                records = report.records_checked,
                entries = report.entries_checked,
                "Ledger is consistent"
            );
        } else {
            tracing::warn!(
                missing = report.total_missing(),
                orphans = report.orphan_count,
                duplicate_origins = report.duplicate_origin_count,
                "Ledger inconsistencies found"
            );
        }
        Ok(report)
    }

    /// Create missing entries, delete orphans, collapse duplicate origins.
    ///
    /// Converges: a second run with no source changes does nothing.
    pub async fn repair(&self) -> Result<RepairReport, GatewayError> {
        let Scan {
            missing,
            orphans,
            duplicate_groups,
            ..
        } = self.scan().await?;
        let mut report = RepairReport::default();

        for record in missing {
            let register = record.register();
            let target = format!("{register} record {}", record.id());
            match self.orchestrator.on_record_added(record).await {
                Ok(SyncOutcome::Created { .. }) => {
                    *report.created_by_origin.entry(register).or_default() += 1;
                }
                Ok(_) => {}
                Err(e) => report.errors.push(RepairFailure {
                    target,
                    message: e.to_string(),
                }),
            }
        }

        for entry_id in orphans {
            match self.ledger.delete(entry_id).await {
                Ok(true) => report.orphans_removed += 1,
                Ok(false) => {}
                Err(e) => report.errors.push(RepairFailure {
                    target: format!("entry {entry_id}"),
                    message: e.to_string(),
                }),
            }
        }

        for group in duplicate_groups {
            for entry in group.iter().skip(1) {
                match self.ledger.delete(entry.id).await {
                    Ok(true) => report.duplicates_removed += 1,
                    Ok(false) => {}
                    Err(e) => report.errors.push(RepairFailure {
                        target: format!("entry {}", entry.id),
                        message: e.to_string(),
                    }),
                }
            }
        }

        tracing::info!(
            created = report.created_by_origin.values().sum::<usize>(),
            orphans_removed = report.orphans_removed,
            duplicates_removed = report.duplicates_removed,
            errors = report.errors.len(),
            "Repair complete"
        );
        Ok(report)
    }

    async fn scan(&self) -> Result<Scan, GatewayError> {
        let mut records = Vec::new();
        for register in Register::ALL {
            records.extend(self.registers.get(register).list().await?);
        }
        let entries = self.ledger.list().await?;
        Ok(scan(records, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Amount, EntryKind, EntryStatus, NewLedgerEntry, PayrollEntry, PayrollStatus,
        TuitionPayment, TuitionStatus,
    };
    use crate::projection::project_tuition;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn paid(id: &str) -> TuitionPayment {
        TuitionPayment {
            id: id.to_string(),
            student_name: format!("Student {id}"),
            amount: Some(dec!(1000)),
            payment_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            status: TuitionStatus::Paid,
            ..Default::default()
        }
    }

    fn entry_for(payment: &TuitionPayment, minutes_ago: i64) -> LedgerEntry {
        project_tuition(payment)
            .unwrap()
            .into_entry(Uuid::new_v4(), Utc::now() - Duration::minutes(minutes_ago))
    }

    #[test]
    fn test_scan_missing_and_pending() {
        let mut pending = paid("t3");
        pending.status = TuitionStatus::Pending;
        let records = vec![paid("t1").into(), paid("t2").into(), pending.into()];
        let entries = vec![entry_for(&paid("t1"), 1)];

        let scan = scan(records, entries);

        assert_eq!(scan.report.missing(Register::Tuition), 1);
        assert_eq!(scan.report.missing(Register::Payroll), 0);
        assert_eq!(scan.missing.len(), 1);
        assert!(!scan.report.is_consistent);
    }

    #[test]
    fn test_scan_orphans() {
        let payroll = PayrollEntry {
            id: "e1".to_string(),
            employee_name: "Awa".to_string(),
            net_salary: Some(dec!(900)),
            effective_date: NaiveDate::from_ymd_opt(2024, 2, 28),
            status: PayrollStatus::Active,
            ..Default::default()
        };
        let mut orphan = entry_for(&paid("gone"), 1);
        orphan.origin = Origin::Payroll;
        orphan.origin_id = Some("e9".to_string());
        let mut anonymous = entry_for(&paid("x"), 1);
        anonymous.origin_id = None;
        let manual = NewLedgerEntry {
            kind: EntryKind::Outflow,
            category: "Rent".to_string(),
            description: "Rent February".to_string(),
            amount: Amount::from_integer(300).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            payment_method: "cash".to_string(),
            status: EntryStatus::Validated,
            reference: String::new(),
            origin: Origin::Manual,
            origin_id: None,
            notes: String::new(),
        }
        .into_entry(Uuid::new_v4(), Utc::now());

        let mut pending = payroll.clone();
        pending.status = PayrollStatus::Pending;
        let scan = scan(vec![pending.into()], vec![orphan, anonymous, manual]);

        assert_eq!(scan.report.orphan_count, 2);
        assert_eq!(scan.orphans.len(), 2);
        assert_eq!(scan.report.total_missing(), 0);
    }

    #[test]
    fn test_signature_covers_record() {
        let record = paid("t1");
        let mut manual = entry_for(&record, 1);
        manual.origin = Origin::Manual;
        manual.origin_id = None;

        let scan = scan(vec![record.into()], vec![manual]);
        assert!(scan.report.is_consistent);
    }

    #[test]
    fn test_duplicate_origin_group() {
        let record = paid("t1");
        let older = entry_for(&record, 10);
        let newer = entry_for(&record, 1);
        let newer_id = newer.id;

        let scan = scan(vec![record.into()], vec![older, newer]);

        assert_eq!(scan.report.duplicate_origin_count, 1);
        assert_eq!(scan.duplicate_groups[0][0].id, newer_id);
        assert!(matches!(
            scan.report.issues[0],
            InvariantViolation::DuplicateOrigin { ref entry_ids, .. } if entry_ids.len() == 2
        ));
    }

    #[test]
    fn test_violation_descriptions() {
        let missing = InvariantViolation::MissingEntry {
            register: Register::Tuition,
            origin_id: "t1".to_string(),
        };
        assert_eq!(missing.describe(), "tuition record t1 has no ledger entry");

        let orphan = InvariantViolation::OrphanEntry {
            entry_id: Uuid::nil(),
            origin: Origin::Payroll,
            origin_id: None,
        };
        assert!(orphan.describe().ends_with("has no origin id"));
    }
}
