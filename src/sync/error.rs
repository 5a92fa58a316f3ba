//! Sync Errors
//!
//! Failures while mirroring a single record, or while attaching a feed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{MappingError, Register};
use crate::gateway::GatewayError;

/// Errors raised by the sync orchestrator
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Record cannot be projected; skipped
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A store operation failed for this record
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The register's change feed could not be attached or broke
    #[error("Subscription to {register} register failed: {message}")]
    Subscription { register: Register, message: String },
}

impl SyncError {
    pub fn subscription(register: Register, message: impl Into<String>) -> Self {
        Self::Subscription {
            register,
            message: message.into(),
        }
    }

    /// Check if this error belongs to one record rather than the feed
    pub fn is_record_scoped(&self) -> bool {
        !matches!(self, SyncError::Subscription { .. })
    }
}

/// A recorded failure, kept for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncErrorRecord {
    pub register: Register,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl SyncErrorRecord {
    pub fn new(register: Register, origin_id: Option<String>, error: &SyncError) -> Self {
        Self {
            register,
            origin_id,
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_scope() {
        let mapping: SyncError = MappingError::missing_field(Register::Tuition, "p1", "amount").into();
        assert!(mapping.is_record_scoped());
        assert!(mapping.to_string().contains("amount"));

        let feed = SyncError::subscription(Register::Payroll, "connection refused");
        assert!(!feed.is_record_scoped());
        assert_eq!(
            feed.to_string(),
            "Subscription to payroll register failed: connection refused"
        );
    }

    #[test]
    fn test_error_record() {
        let err = SyncError::subscription(Register::Tuition, "closed");
        let record = SyncErrorRecord::new(Register::Tuition, None, &err);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["register"], "tuition");
        assert!(json.get("origin_id").is_none());
    }
}
