//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::{AmountError, Register};

/// A source record cannot be projected into a ledger entry.
///
/// Always scoped to one record: the batch it belongs to carries on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    /// Record has no usable id
    #[error("{register} record has no id")]
    MissingId { register: Register },

    /// A field the projection needs is absent or blank
    #[error("{register} record {id} is missing required field '{field}'")]
    MissingField {
        register: Register,
        id: String,
        field: &'static str,
    },

    /// Amount present but not a valid ledger amount
    #[error("{register} record {id} has an invalid amount: {source}")]
    InvalidAmount {
        register: Register,
        id: String,
        source: AmountError,
    },
}

impl MappingError {
    pub fn missing_field(register: Register, id: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            register,
            id: id.into(),
            field,
        }
    }

    pub fn register(&self) -> Register {
        match self {
            Self::MissingId { register }
            | Self::MissingField { register, .. }
            | Self::InvalidAmount { register, .. } => *register,
        }
    }

    /// Id of the offending record, when it had one
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::MissingId { .. } => None,
            Self::MissingField { id, .. } | Self::InvalidAmount { id, .. } => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_missing_field_error() {
        let err = MappingError::missing_field(Register::Tuition, "p1", "studentName");

        assert_eq!(err.register(), Register::Tuition);
        assert_eq!(err.record_id(), Some("p1"));
        assert!(err.to_string().contains("studentName"));
        assert!(err.to_string().contains("p1"));
    }

    #[test]
    fn test_invalid_amount_error() {
        let err = MappingError::InvalidAmount {
            register: Register::Payroll,
            id: "e1".to_string(),
            source: AmountError::NotPositive(Decimal::ZERO),
        };

        assert!(err.to_string().contains("invalid amount"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_missing_id_error() {
        let err = MappingError::MissingId {
            register: Register::Payroll,
        };
        assert_eq!(err.record_id(), None);
        assert_eq!(err.to_string(), "payroll record has no id");
    }
}
