// ============================================
// File: crates/keyfleet-panel/src/error.rs
// ============================================
//! # Panel Error Types
//!
//! ## Creation Reason
//! Defines error types for control-API calls against a node.
//!
//! ## Error Categories
//! 1. **Connectivity**: node unreachable, timeouts, TLS problems
//! 2. **Authentication**: login refused
//! 3. **Remote call**: non-2xx status or a `success:false` body
//! 4. **Decoding**: the panel answered with something we can't read
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never include node passwords or cookies in messages
//! - Connectivity errors are transient; rejected calls usually are not
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

/// Result type for panel operations.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Panel client error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PanelError {
    /// The HTTP client could not be built.
    #[error("Failed to set up HTTP client: {reason}")]
    Setup {
        /// Why setup failed
        reason: String,
    },

    /// The node could not be reached (connect error, timeout, TLS).
    #[error("Node '{node}' unreachable: {reason}")]
    Unreachable {
        /// Node display name
        node: String,
        /// Transport-level reason
        reason: String,
    },

    /// Login was refused.
    #[error("Authentication failed on '{node}': {reason}")]
    AuthenticationFailed {
        /// Node display name
        node: String,
        /// Status or panel message
        reason: String,
    },

    /// A call returned a non-success HTTP status.
    #[error("{operation} returned HTTP {status}")]
    Status {
        /// Operation that failed
        operation: &'static str,
        /// HTTP status code
        status: u16,
    },

    /// The panel answered `success: false`.
    #[error("{operation} rejected by panel: {message}")]
    Rejected {
        /// Operation that failed
        operation: &'static str,
        /// Panel's message
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode {operation} response: {reason}")]
    Decode {
        /// Operation whose response was undecodable
        operation: &'static str,
        /// Decoder error
        reason: String,
    },

    /// The requested inbound does not exist on the node.
    #[error("Inbound {0} not found")]
    InboundNotFound(u64),
}

impl PanelError {
    /// Creates an `Unreachable` error.
    pub fn unreachable(node: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            node: node.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `AuthenticationFailed` error.
    pub fn authentication_failed(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Decode` error.
    pub fn decode(operation: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            operation,
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if a retry later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PanelError::authentication_failed("vienna", "HTTP 401");
        assert_eq!(err.to_string(), "Authentication failed on 'vienna': HTTP 401");
    }

    #[test]
    fn test_error_classification() {
        assert!(PanelError::unreachable("a", "timed out").is_retryable());
        assert!(PanelError::Status { operation: "list inbounds", status: 502 }.is_retryable());
        assert!(!PanelError::Status { operation: "list inbounds", status: 404 }.is_retryable());
        assert!(!PanelError::InboundNotFound(3).is_retryable());
    }
}
