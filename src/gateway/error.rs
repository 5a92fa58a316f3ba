//! Gateway Errors
//!
//! Failures of a single store operation.

use uuid::Uuid;

use crate::domain::UnknownVariant;

/// Errors raised by a ledger or register store
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Entry targeted by an update does not exist
    #[error("Ledger entry not found: {0}")]
    NotFound(Uuid),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row holds data this build cannot read
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Store temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Change feed failed or was closed by the store
    #[error("Change feed failed: {0}")]
    Feed(String),
}

impl GatewayError {
    /// Check if retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Database(_) | GatewayError::Unavailable(_) | GatewayError::Feed(_)
        )
    }
}

impl From<UnknownVariant> for GatewayError {
    fn from(err: UnknownVariant) -> Self {
        GatewayError::Corrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_is_transient() {
        assert!(GatewayError::Unavailable("timeout".to_string()).is_transient());
        assert!(!GatewayError::NotFound(Uuid::nil()).is_transient());
        assert!(!GatewayError::Corrupt("bad kind".to_string()).is_transient());
    }

    #[test]
    fn test_unknown_variant_is_corrupt() {
        let err: GatewayError = UnknownVariant {
            field: "origin",
            value: "import".to_string(),
        }
        .into();
        assert!(err.to_string().contains("import"));
    }
}
