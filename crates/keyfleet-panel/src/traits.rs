// ============================================
// File: crates/keyfleet-panel/src/traits.rs
// ============================================
//! # Panel Traits
//!
//! ## Creation Reason
//! Defines abstract interfaces for control-API operations, enabling the
//! reconciliation engine to run against real nodes or an in-memory fleet.
//!
//! ## Main Functionality
//! - `NodeEndpoint`: Where and how to log in to one node
//! - `PanelConnector`: Opens an authenticated session
//! - `PanelSession`: Operations available inside one session
//! - `Removal`: Outcome of a best-effort delete
//!
//! ## Design Philosophy
//! - Traits enable mock implementations for testing
//! - Async-first design with `async_trait`
//! - "Already absent" is a value, not an error
//!
//! ## ⚠️ Important Note for Next Developer
//! - Implementations must be Send + Sync; sessions cross task boundaries
//! - A session is only valid for the node it was opened against
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Inbound, PanelClient};

// ============================================
// NodeEndpoint
// ============================================

/// Connection details of one node's control API.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    /// Display name (used in logs and errors).
    pub name: String,
    /// Control-API base URL without trailing slash.
    pub base_url: String,
    /// Panel username.
    pub username: String,
    /// Panel password.
    pub password: String,
}

impl NodeEndpoint {
    /// Creates a new endpoint, trimming any trailing `/` from `base_url`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEndpoint")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

// ============================================
// Removal
// ============================================

/// Outcome of a delete-by-label call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The entry existed and was removed.
    Removed,
    /// The panel had no such entry (or refused, which we treat the same).
    Absent,
}

// ============================================
// Traits
// ============================================

/// Opens authenticated sessions against nodes.
#[async_trait]
pub trait PanelConnector: Send + Sync {
    /// Logs in to `endpoint`.
    ///
    /// # Errors
    /// Returns `Unreachable` or `AuthenticationFailed` if no session could
    /// be established.
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Box<dyn PanelSession>>;
}

/// Operations available inside one authenticated session.
#[async_trait]
pub trait PanelSession: Send + Sync {
    /// Lists all inbounds with their settings and statistics.
    async fn list_inbounds(&self) -> Result<Vec<Inbound>>;

    /// Adds one client entry to an inbound.
    async fn add_client(&self, inbound_id: u64, client: &PanelClient) -> Result<()>;

    /// Deletes the client entry labelled `label` from an inbound.
    ///
    /// A non-success answer from the panel is reported as
    /// `Removal::Absent`; only transport failures are errors.
    async fn delete_client(&self, inbound_id: u64, label: &str) -> Result<Removal>;

    /// Fetches one full inbound record.
    async fn get_inbound(&self, inbound_id: u64) -> Result<Inbound>;

    /// Writes one full inbound record back.
    async fn update_inbound(&self, inbound: &Inbound) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let endpoint = NodeEndpoint::new("a", "https://100.64.1.5:2053//", "u", "p");
        assert_eq!(endpoint.base_url, "https://100.64.1.5:2053");
    }

    #[test]
    fn test_endpoint_debug_hides_password() {
        let endpoint = NodeEndpoint::new("a", "https://x", "admin", "hunter2");
        assert!(!format!("{endpoint:?}").contains("hunter2"));
    }
}
