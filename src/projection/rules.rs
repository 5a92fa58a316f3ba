//! Projection Rules
//!
//! Tuition payments become inflows, payroll entries become outflows. Every
//! function here is pure: same record in, same entry out.

use crate::domain::{
    Amount, EntryKind, EntryStatus, MappingError, NewLedgerEntry, PayrollEntry, PayrollStatus,
    Register, SourceRecord, TuitionPayment, TuitionStatus,
};

pub const TUITION_CATEGORY: &str = "Tuition";
pub const PAYROLL_CATEGORY: &str = "Payroll";
pub const PAYROLL_PAYMENT_METHOD: &str = "bank_transfer";
const DEFAULT_TUITION_PAYMENT_METHOD: &str = "cash";

/// Project any source record
pub fn project(record: &SourceRecord) -> Result<NewLedgerEntry, MappingError> {
    match record {
        SourceRecord::Tuition(payment) => project_tuition(payment),
        SourceRecord::Payroll(entry) => project_payroll(entry),
    }
}

/// Project a tuition payment into an inflow
pub fn project_tuition(payment: &TuitionPayment) -> Result<NewLedgerEntry, MappingError> {
    let register = Register::Tuition;
    let id = required_id(register, &payment.id)?;
    let student = required_text(register, id, "studentName", &payment.student_name)?;
    let amount = required_amount(register, id, "amount", payment.amount)?;
    let date = payment
        .payment_date
        .ok_or_else(|| MappingError::missing_field(register, id, "paymentDate"))?;

    let mut description = format!("Tuition - {student}");
    if let Some(class) = non_blank(&payment.class) {
        description.push_str(&format!(" ({class})"));
    }
    if let Some(period) = non_blank(&payment.period) {
        description.push_str(&format!(" - {period}"));
    }

    let payment_method = non_blank(&payment.payment_method)
        .unwrap_or(DEFAULT_TUITION_PAYMENT_METHOD)
        .to_string();

    let reference = non_blank(&payment.reference)
        .map(str::to_string)
        .unwrap_or_else(|| format!("TUI-{id}"));

    Ok(NewLedgerEntry {
        kind: EntryKind::Inflow,
        category: TUITION_CATEGORY.to_string(),
        description,
        amount,
        date,
        payment_method,
        status: tuition_status(payment.status),
        reference,
        origin: register.origin(),
        origin_id: Some(id.to_string()),
        notes: String::new(),
    })
}

/// Project a payroll entry into an outflow
pub fn project_payroll(entry: &PayrollEntry) -> Result<NewLedgerEntry, MappingError> {
    let register = Register::Payroll;
    let id = required_id(register, &entry.id)?;
    let employee = required_text(register, id, "employeeName", &entry.employee_name)?;
    let amount = required_amount(register, id, "netSalary", entry.net_salary)?;
    let date = entry
        .resolved_date()
        .ok_or_else(|| MappingError::missing_field(register, id, "effectiveDate"))?;
    let (month, year) = entry
        .period()
        .ok_or_else(|| MappingError::missing_field(register, id, "paymentMonth"))?;

    let employee_ref = non_blank(&entry.employee_id).unwrap_or(id);

    let mut notes = Vec::new();
    if let Some(position) = non_blank(&entry.position) {
        notes.push(format!("Position: {position}"));
    }
    if let Some(department) = non_blank(&entry.department) {
        notes.push(format!("Department: {department}"));
    }

    Ok(NewLedgerEntry {
        kind: EntryKind::Outflow,
        category: PAYROLL_CATEGORY.to_string(),
        description: format!("Salary - {employee} - {month:02}/{year}"),
        amount,
        date,
        payment_method: PAYROLL_PAYMENT_METHOD.to_string(),
        status: payroll_status(entry.status),
        reference: format!("PAY-{year}{month:02}-{employee_ref}"),
        origin: register.origin(),
        origin_id: Some(id.to_string()),
        notes: notes.join(", "),
    })
}

fn tuition_status(status: TuitionStatus) -> EntryStatus {
    match status {
        TuitionStatus::Paid => EntryStatus::Validated,
        // overdue money is still expected
        TuitionStatus::Pending | TuitionStatus::Overdue | TuitionStatus::Unknown => {
            EntryStatus::Pending
        }
    }
}

fn payroll_status(status: PayrollStatus) -> EntryStatus {
    match status {
        PayrollStatus::Active => EntryStatus::Validated,
        PayrollStatus::Inactive => EntryStatus::Cancelled,
        PayrollStatus::Pending | PayrollStatus::Unknown => EntryStatus::Pending,
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn required_id(register: Register, id: &str) -> Result<&str, MappingError> {
    non_blank(id).ok_or(MappingError::MissingId { register })
}

fn required_text<'a>(
    register: Register,
    id: &str,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, MappingError> {
    non_blank(value).ok_or_else(|| MappingError::missing_field(register, id, field))
}

fn required_amount(
    register: Register,
    id: &str,
    field: &'static str,
    value: Option<rust_decimal::Decimal>,
) -> Result<Amount, MappingError> {
    let value = value.ok_or_else(|| MappingError::missing_field(register, id, field))?;
    Amount::new(value).map_err(|source| MappingError::InvalidAmount {
        register,
        id: id.to_string(),
        source,
    })
}
