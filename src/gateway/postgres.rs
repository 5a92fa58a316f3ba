//! Postgres stores
//!
//! sqlx-backed ledger and registers. The ledger's conditional insert relies
//! on the unique partial index over (origin, origin_id), so two racing
//! creates for the same source record cannot both land. Register change
//! feeds ride on LISTEN/NOTIFY (see migrations/001_reconcile.sql).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgPool, Row};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{
    Amount, ChangeEvent, LedgerEntry, LedgerEntryPatch, NewLedgerEntry, Origin, PayrollEntry,
    PayrollStatus, Register, SourceRecord, TuitionPayment, TuitionStatus,
};
use crate::projection::{digest_of, signature_digest};

use super::{ChangeFeed, GatewayError, InsertOutcome, LedgerGateway, SourceRegister};

const LEDGER_COLUMNS: &str = r#"
    id, kind, category, description, amount, entry_date, payment_method,
    status, reference, origin, origin_id, notes, created_at, updated_at
"#;

// =========================================================================
// Ledger
// =========================================================================

/// Unified ledger stored in `ledger_entries`
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        id: Uuid,
        entry: &NewLedgerEntry,
        on_conflict_skip: bool,
    ) -> Result<Option<Uuid>, GatewayError> {
        let conflict_clause = if on_conflict_skip {
            "ON CONFLICT (origin, origin_id) WHERE origin <> 'manual' AND origin_id IS NOT NULL DO NOTHING"
        } else {
            ""
        };
        let sql = format!(
            r#"
            INSERT INTO ledger_entries (
                id, kind, category, description, amount, entry_date, payment_method,
                status, reference, origin, origin_id, notes, signature_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            {conflict_clause}
            RETURNING id
            "#
        );

        let inserted: Option<Uuid> = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(entry.kind.as_str())
            .bind(&entry.category)
            .bind(&entry.description)
            .bind(entry.amount.value())
            .bind(entry.date)
            .bind(&entry.payment_method)
            .bind(entry.status.as_str())
            .bind(&entry.reference)
            .bind(entry.origin.as_str())
            .bind(&entry.origin_id)
            .bind(&entry.notes)
            .bind(signature_digest(entry))
            .fetch_optional(&self.pool)
            .await?;

        Ok(inserted)
    }
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, GatewayError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let origin: String = row.try_get("origin")?;
    let amount: Decimal = row.try_get("amount")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        kind: kind.parse()?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        amount: Amount::new(amount)
            .map_err(|e| GatewayError::Corrupt(format!("amount {amount}: {e}")))?,
        date: row.try_get("entry_date")?,
        payment_method: row.try_get("payment_method")?,
        status: status.parse()?,
        reference: row.try_get("reference")?,
        origin: origin.parse()?,
        origin_id: row.try_get("origin_id")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl LedgerGateway for PgLedger {
    async fn list(&self) -> Result<Vec<LedgerEntry>, GatewayError> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries ORDER BY created_at ASC");
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(entry_from_row)
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<LedgerEntry>, GatewayError> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(entry_from_row)
            .transpose()
    }

    async fn create(&self, entry: NewLedgerEntry) -> Result<Uuid, GatewayError> {
        let id = Uuid::new_v4();
        self.insert(id, &entry, false).await?;
        Ok(id)
    }

    async fn update(&self, id: Uuid, patch: LedgerEntryPatch) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(GatewayError::NotFound(id))?;

        let mut entry = entry_from_row(&row)?;
        entry.apply_patch(&patch, Utc::now());

        sqlx::query(
            r#"
            UPDATE ledger_entries
            SET
                amount = $2,
                entry_date = $3,
                status = $4,
                description = $5,
                payment_method = $6,
                signature_hash = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(entry.amount.value())
        .bind(entry.date)
        .bind(entry.status.as_str())
        .bind(&entry.description)
        .bind(&entry.payment_method)
        .bind(signature_digest(&entry))
        .bind(entry.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, GatewayError> {
        let rows = sqlx::query("DELETE FROM ledger_entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    async fn find_by_origin(
        &self,
        origin: Origin,
        origin_id: &str,
    ) -> Result<Option<LedgerEntry>, GatewayError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries \
             WHERE origin = $1 AND origin_id = $2 ORDER BY created_at ASC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(origin.as_str())
            .bind(origin_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(entry_from_row)
            .transpose()
    }

    async fn find_by_signature(&self, sig: &str) -> Result<Option<LedgerEntry>, GatewayError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries \
             WHERE signature_hash = $1 ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(digest_of(sig))
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(entry_from_row)
            .transpose()
    }

    async fn insert_for_origin(&self, entry: NewLedgerEntry) -> Result<InsertOutcome, GatewayError> {
        let origin_id = match (entry.origin, entry.origin_id.clone()) {
            (Origin::Manual, _) | (_, None) => {
                return self.create(entry).await.map(InsertOutcome::Created);
            }
            (_, Some(origin_id)) => origin_id,
        };

        if let Some(id) = self.insert(Uuid::new_v4(), &entry, true).await? {
            return Ok(InsertOutcome::Created(id));
        }

        // Lost the race: the winner's row is visible now
        let existing: Uuid = sqlx::query_scalar(
            "SELECT id FROM ledger_entries WHERE origin = $1 AND origin_id = $2",
        )
        .bind(entry.origin.as_str())
        .bind(&origin_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(InsertOutcome::Existing(existing))
    }
}

// =========================================================================
// Registers
// =========================================================================

/// Payload written by the `notify_register_change` trigger
#[derive(Debug, Deserialize)]
struct ChangePayload {
    op: String,
    id: String,
}

/// A source register stored in `tuition_payments` or `payroll_entries`
#[derive(Debug, Clone)]
pub struct PgRegister {
    pool: PgPool,
    register: Register,
}

impl PgRegister {
    pub fn new(pool: PgPool, register: Register) -> Self {
        Self { pool, register }
    }

    pub fn table(register: Register) -> &'static str {
        match register {
            Register::Tuition => "tuition_payments",
            Register::Payroll => "payroll_entries",
        }
    }

    fn channel(&self) -> String {
        format!("{}_changes", Self::table(self.register))
    }

    fn select_sql(&self) -> &'static str {
        match self.register {
            Register::Tuition => {
                r#"
                SELECT id, student_name, amount, payment_date, payment_method,
                       status, class, period, reference
                FROM tuition_payments
                "#
            }
            Register::Payroll => {
                r#"
                SELECT id, employee_id, employee_name, net_salary, effective_date,
                       payment_month, payment_year, position, department, status
                FROM payroll_entries
                "#
            }
        }
    }

    fn record_from_row(&self, row: &PgRow) -> Result<SourceRecord, GatewayError> {
        let record = match self.register {
            Register::Tuition => {
                let status: String = row.try_get("status")?;
                SourceRecord::Tuition(TuitionPayment {
                    id: row.try_get("id")?,
                    student_name: row.try_get("student_name")?,
                    amount: row.try_get("amount")?,
                    payment_date: row.try_get::<Option<NaiveDate>, _>("payment_date")?,
                    payment_method: row.try_get("payment_method")?,
                    status: TuitionStatus::from(status.as_str()),
                    class: row.try_get("class")?,
                    period: row.try_get("period")?,
                    reference: row.try_get("reference")?,
                })
            }
            Register::Payroll => {
                let status: String = row.try_get("status")?;
                let month: Option<i32> = row.try_get("payment_month")?;
                SourceRecord::Payroll(PayrollEntry {
                    id: row.try_get("id")?,
                    employee_id: row.try_get("employee_id")?,
                    employee_name: row.try_get("employee_name")?,
                    net_salary: row.try_get("net_salary")?,
                    effective_date: row.try_get::<Option<NaiveDate>, _>("effective_date")?,
                    payment_month: month.and_then(|m| u32::try_from(m).ok()),
                    payment_year: row.try_get("payment_year")?,
                    position: row.try_get("position")?,
                    department: row.try_get("department")?,
                    status: PayrollStatus::from(status.as_str()),
                })
            }
        };
        Ok(record)
    }

    /// Turn one NOTIFY payload into a change event.
    /// `None` when the row vanished before it could be read.
    async fn resolve_change(&self, payload: &str) -> Result<Option<ChangeEvent>, GatewayError> {
        let change: ChangePayload = serde_json::from_str(payload)?;
        match change.op.as_str() {
            "DELETE" => Ok(Some(ChangeEvent::Removed(change.id))),
            "INSERT" => Ok(self.get(&change.id).await?.map(ChangeEvent::Added)),
            "UPDATE" => Ok(self.get(&change.id).await?.map(ChangeEvent::Modified)),
            other => Err(GatewayError::Corrupt(format!("unknown change op {other}"))),
        }
    }
}

#[async_trait]
impl SourceRegister for PgRegister {
    fn register(&self) -> Register {
        self.register
    }

    async fn list(&self) -> Result<Vec<SourceRecord>, GatewayError> {
        let sql = format!("{} ORDER BY id", self.select_sql());
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| self.record_from_row(row))
            .collect()
    }

    async fn get(&self, id: &str) -> Result<Option<SourceRecord>, GatewayError> {
        let sql = format!("{} WHERE id = $1", self.select_sql());
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(|row| self.record_from_row(row))
            .transpose()
    }

    async fn subscribe(&self) -> Result<ChangeFeed, GatewayError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel()).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let register = self.clone();

        tokio::spawn(async move {
            tracing::debug!(register = %register.register, "Change feed forwarder started");
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    notification = listener.recv() => {
                        let notification = match notification {
                            Ok(notification) => notification,
                            Err(e) => {
                                let _ = tx.send(Err(GatewayError::Feed(e.to_string())));
                                break;
                            }
                        };
                        match register.resolve_change(notification.payload()).await {
                            Ok(Some(event)) => {
                                if tx.send(Ok(event)).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(
                                    register = %register.register,
                                    error = %e,
                                    "Dropping unreadable change notification"
                                );
                            }
                        }
                    }
                }
            }
            tracing::debug!(register = %register.register, "Change feed forwarder stopped");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_tables() {
        assert_eq!(PgRegister::table(Register::Tuition), "tuition_payments");
        assert_eq!(PgRegister::table(Register::Payroll), "payroll_entries");
    }

    #[test]
    fn test_change_payload_parse() {
        let payload: ChangePayload =
            serde_json::from_str(r#"{"op":"DELETE","id":"p1"}"#).unwrap();
        assert_eq!(payload.op, "DELETE");
        assert_eq!(payload.id, "p1");
    }
}
