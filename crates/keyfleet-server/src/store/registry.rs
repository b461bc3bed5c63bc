// ============================================
// File: crates/keyfleet-server/src/store/registry.rs
// ============================================
//! # Node Registry
//!
//! ## Main Functionality
//! - `Node`: One edge node and how to reach its control API
//! - Insert / edit / enable / remove with name uniqueness
//! - Editing name or domain re-synthesizes managed credential URLs
//! - Removal cascades to the node's credentials
//!
//! ## Last Modified
//! v0.1.0 - Initial registry

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use keyfleet_common::time::now_utc;
use keyfleet_common::NodeId;
use keyfleet_panel::NodeEndpoint;

use super::{Store, StoreResult, Tables};
use crate::error::StoreError;

/// A registered edge node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Row id.
    pub id: NodeId,
    /// Unique display name.
    pub name: String,
    /// Control-API base URL, no trailing slash.
    pub base_url: String,
    /// Public domain used in connection URLs.
    pub domain: String,
    /// Control-API username.
    pub username: String,
    /// Control-API password.
    pub password: String,
    /// Disabled nodes are skipped by every fan-out.
    pub enabled: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Connection details for the panel client.
    #[must_use]
    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint::new(&self.name, &self.base_url, &self.username, &self.password)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("domain", &self.domain)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Input for registering a node.
#[derive(Clone)]
pub struct NewNode {
    /// Unique display name.
    pub name: String,
    /// Control-API base URL.
    pub base_url: String,
    /// Public domain.
    pub domain: String,
    /// Control-API username.
    pub username: String,
    /// Control-API password.
    pub password: String,
}

impl fmt::Debug for NewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewNode")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Partial edit of a node; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    /// New name.
    pub name: Option<String>,
    /// New control-API base URL.
    pub base_url: Option<String>,
    /// New public domain.
    pub domain: Option<String>,
    /// New username.
    pub username: Option<String>,
    /// New password.
    pub password: Option<String>,
}

impl NodePatch {
    /// Returns `true` if the edit changes what connection URLs look like.
    #[must_use]
    pub fn touches_urls(&self) -> bool {
        self.name.is_some() || self.domain.is_some()
    }
}

// ============================================
// Table operations
// ============================================

impl Tables {
    fn ensure_unique_node_name(&self, name: &str, except: Option<NodeId>) -> StoreResult<()> {
        let taken = self
            .nodes
            .values()
            .any(|n| n.name == name && Some(n.id) != except);
        if taken {
            return Err(StoreError::duplicate("node", name));
        }
        Ok(())
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> StoreResult<&Node> {
        self.nodes.get(&id).ok_or_else(|| StoreError::not_found("node", id))
    }
}

// ============================================
// Store API
// ============================================

impl Store {
    /// Registers a node (enabled).
    ///
    /// # Errors
    /// Returns `Duplicate` if the name is taken.
    pub fn insert_node(&self, new: NewNode) -> StoreResult<Node> {
        let node = self.write(|t| {
            t.ensure_unique_node_name(&new.name, None)?;
            let node = Node {
                id: t.allocate_node_id(),
                name: new.name,
                base_url: new.base_url.trim_end_matches('/').to_string(),
                domain: new.domain,
                username: new.username,
                password: new.password,
                enabled: true,
                created_at: now_utc(),
            };
            t.nodes.insert(node.id, node.clone());
            Ok(node)
        })?;
        info!(node_id = %node.id, node = %node.name, "Node registered");
        Ok(node)
    }

    /// Applies an edit and rewrites affected credential URLs.
    ///
    /// Returns the updated node and the number of rewritten URLs.
    ///
    /// # Errors
    /// Returns `NotFound` or `Duplicate` (name collision).
    pub fn update_node(&self, id: NodeId, patch: NodePatch) -> StoreResult<(Node, usize)> {
        let rewrite = patch.touches_urls();
        self.write(|t| {
            if let Some(name) = &patch.name {
                t.ensure_unique_node_name(name, Some(id))?;
            }
            let node = t
                .nodes
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("node", id))?;
            if let Some(name) = patch.name {
                node.name = name;
            }
            if let Some(base_url) = patch.base_url {
                node.base_url = base_url.trim_end_matches('/').to_string();
            }
            if let Some(domain) = patch.domain {
                node.domain = domain;
            }
            if let Some(username) = patch.username {
                node.username = username;
            }
            if let Some(password) = patch.password {
                node.password = password;
            }
            let node = node.clone();
            let rewritten = if rewrite { t.rewrite_node_urls(id)? } else { 0 };
            Ok((node, rewritten))
        })
    }

    /// Sets a node's enabled flag.
    ///
    /// # Errors
    /// Returns `NotFound` if the node doesn't exist.
    pub fn set_node_enabled(&self, id: NodeId, enabled: bool) -> StoreResult<Node> {
        self.write(|t| {
            let node = t
                .nodes
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("node", id))?;
            node.enabled = enabled;
            Ok(node.clone())
        })
    }

    /// Removes a node and every credential issued on it.
    ///
    /// Returns the removed node and the number of removed credentials.
    ///
    /// # Errors
    /// Returns `NotFound` if the node doesn't exist.
    pub fn remove_node(&self, id: NodeId) -> StoreResult<(Node, usize)> {
        let (node, removed) = self.write(|t| {
            let node = t
                .nodes
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("node", id))?;
            let before = t.credentials.len();
            t.credentials.retain(|_, c| c.node_id() != Some(id));
            Ok((node, before - t.credentials.len()))
        })?;
        info!(node_id = %id, node = %node.name, credentials = removed, "Node removed");
        Ok((node, removed))
    }

    /// Looks up a node by id.
    ///
    /// # Errors
    /// Returns `NotFound` if the node doesn't exist.
    pub fn node(&self, id: NodeId) -> StoreResult<Node> {
        self.read(|t| t.node_ref(id).cloned())
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<Node> {
        self.read(|t| t.nodes.values().find(|n| n.name == name).cloned())
    }

    /// All nodes in registry order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.read(|t| t.nodes.values().cloned().collect())
    }

    /// Enabled nodes in registry order.
    #[must_use]
    pub fn enabled_nodes(&self) -> Vec<Node> {
        self.read(|t| t.nodes.values().filter(|n| n.enabled).cloned().collect())
    }
}
