//! Projection module
//!
//! Pure mapping from source records to ledger entries, and the signature
//! used to recognise two entries as the same economic event.

mod rules;
mod signature;

pub use rules::{
    project, project_payroll, project_tuition, PAYROLL_CATEGORY, PAYROLL_PAYMENT_METHOD,
    TUITION_CATEGORY,
};
pub use signature::{digest_of, signature, signature_digest, Signed};
