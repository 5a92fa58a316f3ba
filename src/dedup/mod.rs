//! Deduplication Engine
//!
//! Groups ledger entries by signature. Analysis is read-only; removal keeps
//! the most recently created entry of each group and deletes the rest.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{LedgerEntry, NewLedgerEntry};
use crate::gateway::{GatewayError, LedgerGateway};
use crate::projection::signature;

// =========================================================================
// Reports
// =========================================================================

/// Entries sharing one signature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub signature: String,
    pub count: usize,
    pub sample_description: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    /// Newest first; the first id is the one `remove` keeps
    pub entry_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicateAnalysis {
    pub total_entries: usize,
    /// Surplus entries across all groups
    pub total_duplicates: usize,
    pub duplicate_groups: Vec<DuplicateGroup>,
}

impl DuplicateAnalysis {
    pub fn has_duplicates(&self) -> bool {
        !self.duplicate_groups.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupFailure {
    pub entry_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupReport {
    pub duplicates_removed: usize,
    pub kept: usize,
    pub errors: Vec<DedupFailure>,
}

/// Verdict of the pre-create signature check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreateCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<Uuid>,
}

impl CreateCheck {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            existing_id: None,
        }
    }

    pub fn refused(existing_id: Uuid) -> Self {
        Self {
            allowed: false,
            existing_id: Some(existing_id),
        }
    }
}

// =========================================================================
// Grouping
// =========================================================================

/// Keep-newest order: created_at desc, then updated_at desc, then id
pub fn newest_first(a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Groups of more than one entry per signature, each sorted newest first
pub fn duplicate_groups(entries: Vec<LedgerEntry>) -> Vec<(String, Vec<LedgerEntry>)> {
    let mut by_signature: BTreeMap<String, Vec<LedgerEntry>> = BTreeMap::new();
    for entry in entries {
        by_signature.entry(signature(&entry)).or_default().push(entry);
    }

    let mut groups: Vec<(String, Vec<LedgerEntry>)> = by_signature
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(sig, mut members)| {
            members.sort_by(newest_first);
            (sig, members)
        })
        .collect();

    // stable: equal counts stay in signature order
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    groups
}

// =========================================================================
// Engine
// =========================================================================

#[derive(Clone)]
pub struct DeduplicationEngine {
    ledger: Arc<dyn LedgerGateway>,
}

impl DeduplicationEngine {
    pub fn new(ledger: Arc<dyn LedgerGateway>) -> Self {
        Self { ledger }
    }

    /// Report every signature shared by more than one entry
    pub async fn analyze(&self) -> Result<DuplicateAnalysis, GatewayError> {
        let entries = self.ledger.list().await?;
        let total_entries = entries.len();

        let duplicate_groups: Vec<DuplicateGroup> = duplicate_groups(entries)
            .into_iter()
            .map(|(signature, members)| {
                let sample = &members[0];
                DuplicateGroup {
                    count: members.len(),
                    sample_description: sample.description.clone(),
                    amount: sample.amount.value(),
                    date: sample.date,
                    entry_ids: members.iter().map(|entry| entry.id).collect(),
                    signature,
                }
            })
            .collect();

        let total_duplicates = duplicate_groups.iter().map(|g| g.count - 1).sum();

        tracing::debug!(
            total_entries,
            groups = duplicate_groups.len(),
            total_duplicates,
            "Duplicate analysis complete"
        );

        Ok(DuplicateAnalysis {
            total_entries,
            total_duplicates,
            duplicate_groups,
        })
    }

    /// Delete all but the newest entry of every duplicate group.
    ///
    /// Each deletion stands alone: a failure is recorded and the siblings
    /// are still attempted.
    pub async fn remove(&self) -> Result<DedupReport, GatewayError> {
        let groups = duplicate_groups(self.ledger.list().await?);
        let mut report = DedupReport::default();

        for (sig, members) in groups {
            report.kept += 1;
            let keep = members[0].id;

            for entry in members.iter().skip(1) {
                match self.ledger.delete(entry.id).await {
                    Ok(true) => {
                        report.duplicates_removed += 1;
                        tracing::debug!(entry_id = %entry.id, kept = %keep, signature = %sig, "Removed duplicate entry");
                    }
                    Ok(false) => {
                        tracing::debug!(entry_id = %entry.id, "Duplicate entry already gone");
                    }
                    Err(e) => {
                        tracing::warn!(entry_id = %entry.id, error = %e, "Failed to remove duplicate entry");
                        report.errors.push(DedupFailure {
                            entry_id: entry.id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if report.duplicates_removed > 0 || !report.errors.is_empty() {
            tracing::info!(
                removed = report.duplicates_removed,
                kept = report.kept,
                errors = report.errors.len(),
                "Duplicate removal complete"
            );
        }

        Ok(report)
    }

    /// Refuse a candidate whose signature is already in the ledger
    pub async fn prevent_on_create(
        &self,
        candidate: &NewLedgerEntry,
    ) -> Result<CreateCheck, GatewayError> {
        let sig = signature(candidate);
        match self.ledger.find_by_signature(&sig).await? {
            Some(existing) => {
                tracing::debug!(existing_id = %existing.id, signature = %sig, "Create refused, signature exists");
                Ok(CreateCheck::refused(existing.id))
            }
            None => Ok(CreateCheck::allowed()),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
