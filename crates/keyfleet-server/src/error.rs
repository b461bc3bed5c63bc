// ============================================
// File: crates/keyfleet-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Error Layers
//! - `StoreError`: durable state (registry, directory, ledger)
//! - `ReconcileError`: one node's sync/revoke step; always turned into an
//!   outcome record before leaving the fan-out
//! - `FleetError`: what administrative operations return
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use keyfleet_core::CoreError;
use keyfleet_panel::PanelError;

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

// ============================================
// StoreError
// ============================================

/// Errors from the durable store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} '{key}' already exists")]
    Duplicate {
        entity: &'static str,
        key: String,
    },

    #[error("{entity} '{key}' not found")]
    NotFound {
        entity: &'static str,
        key: String,
    },

    #[error("Failed to access state file '{path}': {reason}")]
    Io {
        path: String,
        reason: String,
    },

    #[error("Failed to encode or decode state: {0}")]
    Encoding(String),

    #[error("State file is inconsistent: {0}")]
    Inconsistent(String),
}

impl StoreError {
    pub fn duplicate(entity: &'static str, key: impl ToString) -> Self {
        Self::Duplicate {
            entity,
            key: key.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn io(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Io {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// ============================================
// ReconcileError
// ============================================

/// Failure of a single per-node reconciliation step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("authentication failed: {0}")]
    Authentication(PanelError),

    #[error("primary inbound not found")]
    PrimaryInboundNotFound,

    #[error("remote call failed: {0}")]
    Remote(PanelError),

    #[error("ledger update failed: {0}")]
    Ledger(#[from] StoreError),
}

impl ReconcileError {
    /// Returns `true` if the same step may succeed when run again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Authentication(e) | Self::Remote(e) => e.is_retryable(),
            _ => false,
        }
    }
}

// ============================================
// FleetError
// ============================================

/// Errors returned by administrative operations.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Client '{0}' is disabled")]
    ClientDisabled(String),

    #[error("Client '{0}' has no credentials")]
    NoCredentials(String),

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput {
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Node '{node}': {source}")]
    Reconcile {
        node: String,
        #[source]
        source: ReconcileError,
    },
}

impl FleetError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoCredentials(_) | Self::Store(StoreError::NotFound { .. })
        )
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Duplicate { .. }))
    }

    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::ClientDisabled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FleetError::config_load("/etc/keyfleet.toml", "file not found");
        assert!(err.to_string().contains("/etc/keyfleet.toml"));

        let err = ReconcileError::PrimaryInboundNotFound;
        assert_eq!(err.to_string(), "primary inbound not found");
    }

    #[test]
    fn test_error_classification() {
        let err: FleetError = StoreError::duplicate("node", "vienna").into();
        assert!(err.is_conflict());
        assert!(!err.is_not_found());

        let err: FleetError = StoreError::not_found("client", "alice").into();
        assert!(err.is_not_found());

        assert!(FleetError::ClientDisabled("bob".into()).is_forbidden());
        assert!(FleetError::config_invalid("stats.freshness_secs", "must be > 0").is_config_error());

        let auth = ReconcileError::Authentication(PanelError::unreachable("a", "timeout"));
        assert!(auth.is_retryable());
        assert!(!ReconcileError::PrimaryInboundNotFound.is_retryable());
        assert!(auth.to_string().starts_with("authentication failed"));
    }
}
