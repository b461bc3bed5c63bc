// ============================================
// File: crates/keyfleet-server/src/store/ledger.rs
// ============================================
//! # Credential Ledger
//!
//! ## Creation Reason
//! The ledger is the authoritative local record of what has been issued to
//! whom and where. Reconciliation converges nodes towards it.
//!
//! ## Main Functionality
//! - `Credential`: One issued connection URL
//! - `CredentialOrigin`: Managed (auto-issued on a node inbound) or Manual
//! - Upsert keyed by (client, node, inbound)
//! - Canonical identifier recovery for a client
//! - URL re-synthesis after node edits
//!
//! ## ⚠️ Important Note for Next Developer
//! - At most one managed credential per (client, node, inbound)
//! - Manual credentials are never touched by reconciliation; only
//!   `remove_credential` or a client cascade deletes them
//! - URLs of managed credentials are derived data: identifier, remote label
//!   and profile are what matter
//!
//! ## Last Modified
//! v0.1.0 - Initial ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use keyfleet_common::time::now_utc;
use keyfleet_common::{ClientId, CredentialId, Identifier, NodeId};
use keyfleet_core::{build_url, credential_label, TransportProfile};

use super::{Store, StoreResult, Tables};
use crate::error::StoreError;

// ============================================
// Types
// ============================================

/// Where a managed credential lives on the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Managed {
    /// Node the credential was issued on.
    pub node_id: NodeId,
    /// Panel inbound id on that node.
    pub inbound_id: u64,
    /// Identifier the client presents.
    pub identifier: Identifier,
    /// Label of the client entry on the panel.
    pub remote_label: String,
    /// Transport profile of the inbound.
    pub profile: TransportProfile,
}

/// Provenance of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CredentialOrigin {
    /// Issued by reconciliation on a node inbound.
    Managed(Managed),
    /// Entered by an operator; opaque to the engine.
    Manual,
}

/// One issued credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Row id.
    pub id: CredentialId,
    /// Owning client.
    pub client_id: ClientId,
    /// Provenance.
    pub origin: CredentialOrigin,
    /// Connection URL handed to the client.
    pub url: String,
    /// Enabled flag as last pushed to the node.
    pub enabled: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Managed location, if auto-issued.
    #[must_use]
    pub fn managed(&self) -> Option<&Managed> {
        match &self.origin {
            CredentialOrigin::Managed(managed) => Some(managed),
            CredentialOrigin::Manual => None,
        }
    }

    /// Node the credential lives on, if auto-issued.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        self.managed().map(|m| m.node_id)
    }

    /// Returns `true` for operator-entered credentials.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        matches!(self.origin, CredentialOrigin::Manual)
    }
}

// ============================================
// Table operations
// ============================================

impl Tables {
    /// Re-synthesizes URLs of managed credentials on `node_id`.
    pub(crate) fn rewrite_node_urls(&mut self, node_id: NodeId) -> StoreResult<usize> {
        let node = self.node_ref(node_id)?.clone();
        let mut rewritten = 0;

        let targets: Vec<(CredentialId, ClientId, Managed)> = self
            .credentials
            .values()
            .filter_map(|c| match &c.origin {
                CredentialOrigin::Managed(m) if m.node_id == node_id => {
                    Some((c.id, c.client_id, m.clone()))
                }
                _ => None,
            })
            .collect();

        for (id, client_id, managed) in targets {
            let client_label = self.client_ref(client_id)?.label.clone();
            let url = build_url(
                &node.domain,
                managed.identifier,
                &credential_label(&node.name, &client_label),
                managed.profile,
            );
            if let Some(credential) = self.credentials.get_mut(&id) {
                if credential.url != url {
                    credential.url = url;
                    credential.updated_at = now_utc();
                    rewritten += 1;
                }
            }
        }
        Ok(rewritten)
    }
}

// ============================================
// Store API
// ============================================

impl Store {
    /// Inserts or updates the managed credential for
    /// (client, node, inbound).
    ///
    /// # Errors
    /// Returns `NotFound` if the client or node no longer exists.
    pub fn upsert_managed(
        &self,
        client_id: ClientId,
        managed: Managed,
        url: String,
        enabled: bool,
    ) -> StoreResult<Credential> {
        self.write(|t| {
            t.client_ref(client_id)?;
            t.node_ref(managed.node_id)?;
            let now = now_utc();

            let existing = t.credentials.values_mut().find(|c| {
                c.client_id == client_id
                    && c.managed().is_some_and(|m| {
                        m.node_id == managed.node_id && m.inbound_id == managed.inbound_id
                    })
            });

            if let Some(credential) = existing {
                credential.origin = CredentialOrigin::Managed(managed);
                credential.url = url;
                credential.enabled = enabled;
                credential.updated_at = now;
                debug!(credential_id = %credential.id, "Credential updated");
                return Ok(credential.clone());
            }

            let credential = Credential {
                id: t.allocate_credential_id(),
                client_id,
                origin: CredentialOrigin::Managed(managed),
                url,
                enabled,
                created_at: now,
                updated_at: now,
            };
            debug!(credential_id = %credential.id, "Credential issued");
            t.credentials.insert(credential.id, credential.clone());
            Ok(credential)
        })
    }

    /// Deletes every managed credential of `client_id` on `node_id`.
    ///
    /// Returns the number of removed rows. Missing rows are not an error.
    ///
    /// # Errors
    /// Returns an error only if the state can't be persisted.
    pub fn remove_managed(&self, client_id: ClientId, node_id: NodeId) -> StoreResult<usize> {
        self.write(|t| {
            let before = t.credentials.len();
            t.credentials
                .retain(|_, c| !(c.client_id == client_id && c.node_id() == Some(node_id)));
            Ok(before - t.credentials.len())
        })
    }

    /// Deletes the managed credential of `client_id` on `node_id` issued
    /// under `profile`.
    ///
    /// Returns the number of removed rows; nothing is written if there is
    /// no such row.
    ///
    /// # Errors
    /// Returns an error only if the state can't be persisted.
    pub fn remove_managed_profile(
        &self,
        client_id: ClientId,
        node_id: NodeId,
        profile: TransportProfile,
    ) -> StoreResult<usize> {
        let matches = |c: &Credential| {
            c.client_id == client_id
                && c.managed()
                    .is_some_and(|m| m.node_id == node_id && m.profile == profile)
        };
        if !self.read(|t| t.credentials.values().any(matches)) {
            return Ok(0);
        }
        self.write(|t| {
            let before = t.credentials.len();
            t.credentials.retain(|_, c| !matches(c));
            Ok(before - t.credentials.len())
        })
    }

    /// Records an operator-entered credential.
    ///
    /// # Errors
    /// Returns `NotFound` if the client doesn't exist.
    pub fn add_manual(&self, client_id: ClientId, url: &str) -> StoreResult<Credential> {
        self.write(|t| {
            t.client_ref(client_id)?;
            let now = now_utc();
            let credential = Credential {
                id: t.allocate_credential_id(),
                client_id,
                origin: CredentialOrigin::Manual,
                url: url.to_string(),
                enabled: true,
                created_at: now,
                updated_at: now,
            };
            t.credentials.insert(credential.id, credential.clone());
            Ok(credential)
        })
    }

    /// Deletes one credential row.
    ///
    /// # Errors
    /// Returns `NotFound` if the row doesn't exist.
    pub fn remove_credential(&self, id: CredentialId) -> StoreResult<Credential> {
        self.write(|t| {
            t.credentials
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("credential", id))
        })
    }

    /// Credentials of a client, ordered by id.
    #[must_use]
    pub fn credentials_for_client(&self, client_id: ClientId) -> Vec<Credential> {
        self.read(|t| {
            t.credentials
                .values()
                .filter(|c| c.client_id == client_id)
                .cloned()
                .collect()
        })
    }

    /// Managed credentials issued on a node, ordered by id.
    #[must_use]
    pub fn credentials_on_node(&self, node_id: NodeId) -> Vec<Credential> {
        self.read(|t| {
            t.credentials
                .values()
                .filter(|c| c.node_id() == Some(node_id))
                .cloned()
                .collect()
        })
    }

    /// The identifier shared by a client's managed credentials.
    ///
    /// Taken from the oldest managed credential; `None` if the client has
    /// never been provisioned anywhere.
    #[must_use]
    pub fn canonical_identifier(&self, client_id: ClientId) -> Option<Identifier> {
        self.read(|t| {
            t.credentials
                .values()
                .filter(|c| c.client_id == client_id)
                .find_map(|c| c.managed().map(|m| m.identifier))
        })
    }
}
