// ============================================
// File: crates/keyfleet-server/src/store/directory.rs
// ============================================
//! # Client Directory
//!
//! ## Main Functionality
//! - `Client`: One end user, keyed by a unique label
//! - Enabled flag and connection limit edits
//! - Removal cascades to every credential the client owns
//!
//! ## Last Modified
//! v0.1.0 - Initial directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use keyfleet_common::time::now_utc;
use keyfleet_common::ClientId;

use super::{Store, StoreResult, Tables};
use crate::error::StoreError;

/// An end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Row id.
    pub id: ClientId,
    /// Unique label (email-shaped).
    pub label: String,
    /// Disabled clients have their credentials deactivated fleet-wide.
    pub enabled: bool,
    /// Maximum simultaneous IPs, 0 = unlimited.
    #[serde(default)]
    pub limit_ip: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit.
    pub updated_at: DateTime<Utc>,
}

impl Tables {
    pub(crate) fn client_ref(&self, id: ClientId) -> StoreResult<&Client> {
        self.clients
            .get(&id)
            .ok_or_else(|| StoreError::not_found("client", id))
    }

    fn client_mut(&mut self, id: ClientId) -> StoreResult<&mut Client> {
        self.clients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("client", id))
    }
}

impl Store {
    /// Adds a client.
    ///
    /// # Errors
    /// Returns `Duplicate` if the label is taken.
    pub fn insert_client(&self, label: &str, enabled: bool, limit_ip: u32) -> StoreResult<Client> {
        let client = self.write(|t| {
            if t.clients.values().any(|c| c.label == label) {
                return Err(StoreError::duplicate("client", label));
            }
            let now = now_utc();
            let client = Client {
                id: t.allocate_client_id(),
                label: label.to_string(),
                enabled,
                limit_ip,
                created_at: now,
                updated_at: now,
            };
            t.clients.insert(client.id, client.clone());
            Ok(client)
        })?;
        info!(client_id = %client.id, client = %client.label, "Client created");
        Ok(client)
    }

    /// Persists a client's enabled flag.
    ///
    /// # Errors
    /// Returns `NotFound` if the client doesn't exist.
    pub fn set_client_enabled(&self, id: ClientId, enabled: bool) -> StoreResult<Client> {
        self.write(|t| {
            let client = t.client_mut(id)?;
            client.enabled = enabled;
            client.updated_at = now_utc();
            Ok(client.clone())
        })
    }

    /// Persists a client's connection limit.
    ///
    /// # Errors
    /// Returns `NotFound` if the client doesn't exist.
    pub fn set_connection_limit(&self, id: ClientId, limit_ip: u32) -> StoreResult<Client> {
        self.write(|t| {
            let client = t.client_mut(id)?;
            client.limit_ip = limit_ip;
            client.updated_at = now_utc();
            Ok(client.clone())
        })
    }

    /// Removes a client and all its credentials.
    ///
    /// Returns the removed client and the number of removed credentials.
    ///
    /// # Errors
    /// Returns `NotFound` if the client doesn't exist.
    pub fn remove_client(&self, id: ClientId) -> StoreResult<(Client, usize)> {
        let (client, removed) = self.write(|t| {
            let client = t
                .clients
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("client", id))?;
            let before = t.credentials.len();
            t.credentials.retain(|_, c| c.client_id != id);
            Ok((client, before - t.credentials.len()))
        })?;
        info!(client_id = %id, client = %client.label, credentials = removed, "Client removed");
        Ok((client, removed))
    }

    /// Looks up a client by id.
    ///
    /// # Errors
    /// Returns `NotFound` if the client doesn't exist.
    pub fn client(&self, id: ClientId) -> StoreResult<Client> {
        self.read(|t| t.client_ref(id).cloned())
    }

    /// Looks up a client by label.
    #[must_use]
    pub fn client_by_label(&self, label: &str) -> Option<Client> {
        self.read(|t| t.clients.values().find(|c| c.label == label).cloned())
    }

    /// All clients in creation order.
    #[must_use]
    pub fn clients(&self) -> Vec<Client> {
        self.read(|t| t.clients.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_labels() {
        let store = Store::in_memory();
        store.insert_client("alice", true, 0).unwrap();
        assert!(matches!(
            store.insert_client("alice", false, 0),
            Err(StoreError::Duplicate { .. })
        ));
        assert_eq!(store.clients().len(), 1);
    }

    #[test]
    fn test_flag_and_limit_edits() {
        let store = Store::in_memory();
        let client = store.insert_client("bob", true, 0).unwrap();

        let disabled = store.set_client_enabled(client.id, false).unwrap();
        assert!(!disabled.enabled);
        assert!(disabled.updated_at >= client.updated_at);

        store.set_connection_limit(client.id, 3).unwrap();
        assert_eq!(store.client_by_label("bob").unwrap().limit_ip, 3);
        assert!(store.set_client_enabled(ClientId::new(42), true).is_err());
    }

    #[test]
    fn test_remove_cascades_manual_credentials() {
        let store = Store::in_memory();
        let client = store.insert_client("carol", true, 0).unwrap();
        store.add_manual(client.id, "ss://abc@host:8388").unwrap();
        store.add_manual(client.id, "trojan://pw@host:443").unwrap();

        let (_, removed) = store.remove_client(client.id).unwrap();
        assert_eq!(removed, 2);
        assert!(store.client(client.id).is_err());
        assert!(store.credentials_for_client(client.id).is_empty());
    }
}
