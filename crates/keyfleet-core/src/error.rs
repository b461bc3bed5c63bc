// ============================================
// File: crates/keyfleet-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while handling connection material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A manually supplied link was rejected.
    #[error("Invalid connection link: {reason}")]
    InvalidLink {
        /// Why the link was rejected
        reason: String,
    },

    /// Unknown transport profile name.
    #[error("Unknown transport profile '{0}' (expected grpc or xhttp)")]
    UnknownProfile(String),

    /// A subscription bundle could not be decoded.
    #[error("Failed to decode subscription bundle: {details}")]
    BundleDecoding {
        /// Error details
        details: String,
    },
}

impl CoreError {
    /// Creates an `InvalidLink` error.
    pub fn invalid_link(reason: impl Into<String>) -> Self {
        Self::InvalidLink {
            reason: reason.into(),
        }
    }
}
