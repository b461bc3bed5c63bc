// ============================================
// File: crates/keyfleet-server/src/services/fleet.rs
// ============================================
//! # Fleet Facade
//!
//! ## Creation Reason
//! Administrative operations span many nodes. This module owns the shared
//! state and runs per-node reconciliation steps concurrently.
//!
//! ## Main Functionality
//! - `apply` / `revoke`: Converge one client across every enabled node
//! - `backfill_node`: Provision every existing client on one node
//! - Node and client lifecycle wrapping the store
//! - Subscription bundles and fleet statistics
//!
//! ## Fan-out
//! ```text
//!            ┌── permit ──► task(node 1) ──┐
//! nodes ─────┼── permit ──► task(node 2) ──┼──► outcomes (registry order)
//!            └── wait ────► task(node 3) ──┘
//!   semaphore: min(max_concurrency, nodes)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Per-node tasks are spawned; dropping the caller does not cancel them
//! - One identifier per `apply`, shared by every node
//! - Store errors return early; remote errors become outcomes
//!
//! ## Last Modified
//! v0.1.0 - Initial fleet facade

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use keyfleet_common::{CredentialId, Identifier};
use keyfleet_core::{encode_bundle, validate_manual_link};
use keyfleet_panel::PanelConnector;

use crate::config::{FleetConfig, ReconcileConfig, SubscriptionConfig};
use crate::error::{FleetError, Result, StoreError};
use crate::services::reconcile::{DriftReport, NodeOutcome, Reconciler};
use crate::services::stats::{NodeSnapshot, StatsCache};
use crate::store::{Client, Credential, NewNode, Node, NodePatch, Store};

// ============================================
// Reports
// ============================================

/// Outcome of one client's step on a single node.
#[derive(Debug, Clone, Serialize)]
pub struct ClientOutcome {
    /// Client label.
    pub client: String,
    /// What happened on the node.
    pub outcome: NodeOutcome,
}

/// Result of provisioning every client on one node.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    /// Node that was backfilled.
    pub node: String,
    /// Clients provisioned.
    pub succeeded: usize,
    /// Clients that failed.
    pub failed: usize,
    /// Per-client outcomes in directory order.
    pub outcomes: Vec<ClientOutcome>,
}

impl BackfillReport {
    fn new(node: &Node, outcomes: Vec<ClientOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.outcome.is_success()).count();
        Self {
            node: node.name.clone(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }
}

/// Result of removing a node.
#[derive(Debug, Clone, Serialize)]
pub struct RemovalReport {
    /// Removed node.
    pub node: String,
    /// Revocation outcome per affected client.
    pub revocations: Vec<ClientOutcome>,
    /// Ledger rows removed by the cascade.
    pub removed_credentials: usize,
}

/// A client's subscription.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    /// Where proxy apps fetch the bundle.
    pub link: String,
    /// Base64 bundle of every URL.
    pub bundle: String,
    /// The URLs in credential order.
    pub urls: Vec<String>,
}

// ============================================
// Fleet
// ============================================

/// Entry point for administrative operations.
pub struct Fleet {
    store: Arc<Store>,
    stats: Arc<StatsCache>,
    reconciler: Arc<Reconciler>,
    reconcile: ReconcileConfig,
    subscription: SubscriptionConfig,
}

impl Fleet {
    /// Wires the fleet from configuration.
    pub fn new(config: &FleetConfig, store: Arc<Store>, connector: Arc<dyn PanelConnector>) -> Self {
        let stats = Arc::new(StatsCache::new(
            Arc::clone(&connector),
            config.inbounds.clone(),
            &config.stats,
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&stats),
            connector,
            config.inbounds.clone(),
        ));

        Self {
            store,
            stats,
            reconciler,
            reconcile: config.reconcile.clone(),
            subscription: config.subscription.clone(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ============================================
    // Lookups
    // ============================================

    fn client(&self, label: &str) -> Result<Client> {
        self.store
            .client_by_label(label)
            .ok_or_else(|| StoreError::not_found("client", label).into())
    }

    fn node(&self, name: &str) -> Result<Node> {
        self.store
            .node_by_name(name)
            .ok_or_else(|| StoreError::not_found("node", name).into())
    }

    /// All nodes in registry order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.store.nodes()
    }

    /// All clients in directory order.
    #[must_use]
    pub fn clients(&self) -> Vec<Client> {
        self.store.clients()
    }

    /// A client's credentials in id order.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown label.
    pub fn credentials(&self, label: &str) -> Result<Vec<Credential>> {
        let client = self.client(label)?;
        Ok(self.store.credentials_for_client(client.id))
    }

    // ============================================
    // Reconciliation
    // ============================================

    /// Persists the client's enabled flag and syncs it on every enabled node.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown label or a store failure.
    pub async fn apply(&self, label: &str, enabled: bool) -> Result<Vec<NodeOutcome>> {
        let client = self.client(label)?;
        let client = self.store.set_client_enabled(client.id, enabled)?;
        let identifier = self.identifier_for(&client);
        let nodes = self.store.enabled_nodes();

        info!(client = %client.label, enabled, nodes = nodes.len(), "Applying client");
        let outcomes = self
            .fan_out(nodes, move |reconciler, node| {
                let client = client.clone();
                async move { reconciler.sync(&node, &client, identifier).await }
            })
            .await;
        log_summary("apply", label, &outcomes);
        Ok(outcomes)
    }

    /// Revokes the client on every enabled node.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown label.
    pub async fn revoke(&self, label: &str) -> Result<Vec<NodeOutcome>> {
        let client = self.client(label)?;
        let nodes = self.store.enabled_nodes();

        info!(client = %client.label, nodes = nodes.len(), "Revoking client");
        let outcomes = self
            .fan_out(nodes, move |reconciler, node| {
                let client = client.clone();
                async move { reconciler.revoke(&node, &client).await }
            })
            .await;
        log_summary("revoke", label, &outcomes);
        Ok(outcomes)
    }

    /// Provisions every existing client on one node.
    ///
    /// Each client keeps the identifier it already has elsewhere.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown node.
    pub async fn backfill_node(&self, name: &str) -> Result<BackfillReport> {
        let node = self.node(name)?;
        Ok(self.backfill(&node).await)
    }

    async fn backfill(&self, node: &Node) -> BackfillReport {
        let clients = self.store.clients();
        info!(node = %node.name, clients = clients.len(), "Backfilling node");

        let mut outcomes = Vec::with_capacity(clients.len());
        for client in clients {
            let identifier = self
                .store
                .canonical_identifier(client.id)
                .unwrap_or_else(Identifier::generate);
            let outcome = self.reconciler.sync(node, &client, identifier).await;
            outcomes.push(ClientOutcome {
                client: client.label,
                outcome,
            });
        }

        let report = BackfillReport::new(node, outcomes);
        info!(
            node = %node.name,
            succeeded = report.succeeded,
            failed = report.failed,
            "Backfill finished"
        );
        report
    }

    /// Compares the ledger with a node's remote entries.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown node or `Reconcile` if the node
    /// can't be read.
    pub async fn audit_node(&self, name: &str) -> Result<DriftReport> {
        let node = self.node(name)?;
        self.reconciler
            .audit(&node)
            .await
            .map_err(|source| FleetError::Reconcile {
                node: node.name,
                source,
            })
    }

    fn identifier_for(&self, client: &Client) -> Identifier {
        if self.reconcile.rotate_identifier {
            return Identifier::generate();
        }
        self.store
            .canonical_identifier(client.id)
            .unwrap_or_else(Identifier::generate)
    }

    async fn fan_out<F, Fut>(&self, nodes: Vec<Node>, step: F) -> Vec<NodeOutcome>
    where
        F: Fn(Arc<Reconciler>, Node) -> Fut,
        Fut: Future<Output = NodeOutcome> + Send + 'static,
    {
        let permits = self.reconcile.max_concurrency.min(nodes.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut handles = Vec::with_capacity(nodes.len());
        for node in nodes {
            let task = step(Arc::clone(&self.reconciler), node.clone());
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                task.await
            });
            handles.push((node, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (node, handle) in handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Node task aborted");
                    NodeOutcome::failed(&node, format!("task aborted: {e}"))
                }
            });
        }
        outcomes
    }

    // ============================================
    // Nodes
    // ============================================

    /// Registers a node and provisions every existing client on it.
    ///
    /// # Errors
    /// Returns `InvalidInput` for malformed fields or `Duplicate` for a
    /// taken name.
    pub async fn add_node(&self, new: NewNode) -> Result<(Node, BackfillReport)> {
        validate_node_fields(Some(&new.name), Some(&new.base_url), Some(&new.domain))?;
        let node = self.store.insert_node(new)?;
        let report = self.backfill(&node).await;
        Ok((node, report))
    }

    /// Edits a node; returns it with the number of rewritten URLs.
    ///
    /// # Errors
    /// Returns `NotFound`, `Duplicate` or `InvalidInput`.
    pub fn update_node(&self, name: &str, patch: NodePatch) -> Result<(Node, usize)> {
        validate_node_fields(
            patch.name.as_deref(),
            patch.base_url.as_deref(),
            patch.domain.as_deref(),
        )?;
        let node = self.node(name)?;
        let (node, rewritten) = self.store.update_node(node.id, patch)?;
        self.stats.invalidate(node.id);
        info!(node = %node.name, rewritten, "Node updated");
        Ok((node, rewritten))
    }

    /// Enables or disables a node for future fan-outs.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown node.
    pub fn set_node_enabled(&self, name: &str, enabled: bool) -> Result<Node> {
        let node = self.node(name)?;
        let node = self.store.set_node_enabled(node.id, enabled)?;
        self.stats.invalidate(node.id);
        info!(node = %node.name, enabled, "Node toggled");
        Ok(node)
    }

    /// Revokes every client provisioned on the node, then removes it.
    ///
    /// Remote revocation is best effort; the node is removed regardless.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown node.
    pub async fn remove_node(&self, name: &str) -> Result<RemovalReport> {
        let node = self.node(name)?;

        let mut affected: Vec<_> = self
            .store
            .credentials_on_node(node.id)
            .into_iter()
            .map(|c| c.client_id)
            .collect();
        affected.sort_unstable();
        affected.dedup();

        let mut revocations = Vec::with_capacity(affected.len());
        for client_id in affected {
            let client = self.store.client(client_id)?;
            let outcome = self.reconciler.revoke(&node, &client).await;
            revocations.push(ClientOutcome {
                client: client.label,
                outcome,
            });
        }

        let (node, removed_credentials) = self.store.remove_node(node.id)?;
        self.stats.invalidate(node.id);
        Ok(RemovalReport {
            node: node.name,
            revocations,
            removed_credentials,
        })
    }

    // ============================================
    // Clients
    // ============================================

    /// Creates an enabled client and provisions it fleet-wide.
    ///
    /// # Errors
    /// Returns `InvalidInput` for a malformed label or `Duplicate`.
    pub async fn create_client(&self, label: &str, limit_ip: u32) -> Result<(Client, Vec<NodeOutcome>)> {
        validate_label(label)?;
        self.store.insert_client(label, true, limit_ip)?;
        let outcomes = self.apply(label, true).await?;
        Ok((self.client(label)?, outcomes))
    }

    /// Re-enables a client fleet-wide.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown label.
    pub async fn enable_client(&self, label: &str) -> Result<Vec<NodeOutcome>> {
        self.apply(label, true).await
    }

    /// Disables a client fleet-wide; its entries stay but are inactive.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown label.
    pub async fn disable_client(&self, label: &str) -> Result<Vec<NodeOutcome>> {
        self.apply(label, false).await
    }

    /// Revokes a client fleet-wide and deletes it with all credentials.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown label.
    pub async fn delete_client(&self, label: &str) -> Result<(Vec<NodeOutcome>, usize)> {
        let outcomes = self.revoke(label).await?;
        let client = self.client(label)?;
        let (_, removed) = self.store.remove_client(client.id)?;
        Ok((outcomes, removed))
    }

    /// Persists a connection limit and pushes it to every enabled node.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown label.
    pub async fn set_connection_limit(&self, label: &str, limit_ip: u32) -> Result<Vec<NodeOutcome>> {
        let client = self.client(label)?;
        let client = self.store.set_connection_limit(client.id, limit_ip)?;
        let nodes = self.store.enabled_nodes();

        info!(client = %client.label, limit_ip, "Setting connection limit");
        let outcomes = self
            .fan_out(nodes, move |reconciler, node| {
                let client = client.clone();
                async move { reconciler.push_limit(&node, &client).await }
            })
            .await;
        log_summary("limit", label, &outcomes);
        Ok(outcomes)
    }

    // ============================================
    // Credentials
    // ============================================

    /// Records an operator-entered link for a client.
    ///
    /// # Errors
    /// Returns `Core` for an invalid link or `NotFound`.
    pub fn add_manual_credential(&self, label: &str, link: &str) -> Result<Credential> {
        let link = validate_manual_link(link)?;
        let client = self.client(label)?;
        let credential = self.store.add_manual(client.id, link)?;
        info!(client = %client.label, credential_id = %credential.id, "Manual credential added");
        Ok(credential)
    }

    /// Deletes one ledger row. Remote entries are left alone.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id.
    pub fn delete_credential(&self, id: CredentialId) -> Result<Credential> {
        let credential = self.store.remove_credential(id)?;
        info!(credential_id = %id, manual = credential.is_manual(), "Credential deleted");
        Ok(credential)
    }

    /// Builds the client's subscription bundle.
    ///
    /// # Errors
    /// - `NotFound` for an unknown label
    /// - `ClientDisabled` for a disabled client
    /// - `NoCredentials` if the client has nothing to hand out
    pub fn subscription(&self, label: &str) -> Result<Subscription> {
        let client = self.client(label)?;
        if !client.enabled {
            return Err(FleetError::ClientDisabled(client.label));
        }

        let urls: Vec<String> = self
            .store
            .credentials_for_client(client.id)
            .into_iter()
            .map(|c| c.url)
            .collect();
        if urls.is_empty() {
            return Err(FleetError::NoCredentials(client.label));
        }

        debug!(client = %client.label, urls = urls.len(), "Subscription built");
        Ok(Subscription {
            link: self.subscription.link_for(&client.label),
            bundle: encode_bundle(&urls),
            urls,
        })
    }

    // ============================================
    // Stats
    // ============================================

    /// Snapshot of one node, served from cache when fresh.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown node.
    pub async fn get_stats(&self, name: &str) -> Result<Arc<NodeSnapshot>> {
        let node = self.node(name)?;
        Ok(self.stats.get(&node).await)
    }

    /// Snapshots of every node, queried concurrently.
    pub async fn fleet_stats(&self) -> Vec<(Node, Arc<NodeSnapshot>)> {
        let handles: Vec<_> = self
            .store
            .nodes()
            .into_iter()
            .map(|node| {
                let stats = Arc::clone(&self.stats);
                let task_node = node.clone();
                (node, tokio::spawn(async move { stats.get(&task_node).await }))
            })
            .collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for (node, handle) in handles {
            let snapshot = handle
                .await
                .unwrap_or_else(|_| Arc::new(NodeSnapshot::offline()));
            snapshots.push((node, snapshot));
        }
        snapshots
    }
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("store", &self.store)
            .field("stats", &self.stats)
            .field("reconcile", &self.reconcile)
            .finish_non_exhaustive()
    }
}

// ============================================
// Helpers
// ============================================

fn log_summary(operation: &str, label: &str, outcomes: &[NodeOutcome]) {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    info!(
        operation,
        client = %label,
        succeeded,
        failed = outcomes.len() - succeeded,
        "Fan-out finished"
    );
}

fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(FleetError::invalid_input("label", "cannot be empty"));
    }
    if label.chars().any(char::is_whitespace) {
        return Err(FleetError::invalid_input("label", "cannot contain whitespace"));
    }
    Ok(())
}

fn validate_node_fields(name: Option<&str>, base_url: Option<&str>, domain: Option<&str>) -> Result<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(FleetError::invalid_input("name", "cannot be empty"));
    }
    if let Some(url) = base_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FleetError::invalid_input("base_url", "must be an http(s) URL"));
        }
    }
    if domain.is_some_and(|d| d.trim().is_empty() || d.contains('/')) {
        return Err(FleetError::invalid_input("domain", "must be a bare host name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyfleet_core::decode_bundle;
    use keyfleet_panel::MockPanel;

    use std::time::Duration;

    use crate::services::reconcile::OutcomeStatus;

    const URL_A: &str = "https://a.internal:2053";
    const URL_B: &str = "https://b.internal:2053";

    fn new_node(name: &str, url: &str) -> NewNode {
        NewNode {
            name: name.to_string(),
            base_url: url.to_string(),
            domain: format!("{}.example.com", name.to_lowercase()),
            username: "admin".to_string(),
            password: "pw".to_string(),
        }
    }

    fn panel_node(panel: &MockPanel, url: &str) {
        panel.add_node(url, "admin", "pw");
        panel.add_inbound(url, "vless", "vless-grpc");
    }

    fn fleet_with(config: &FleetConfig) -> (MockPanel, Fleet) {
        let panel = MockPanel::new();
        panel_node(&panel, URL_A);
        panel_node(&panel, URL_B);

        let store = Arc::new(Store::in_memory());
        store.insert_node(new_node("A", URL_A)).unwrap();
        store.insert_node(new_node("B", URL_B)).unwrap();

        let fleet = Fleet::new(config, store, Arc::new(panel.clone()));
        (panel, fleet)
    }

    fn fleet() -> (MockPanel, Fleet) {
        fleet_with(&FleetConfig::default())
    }

    /// Adds `extra` nodes and gives every node a login delay of `latency`.
    fn slow_fleet(config: &FleetConfig, extra: usize, latency: Duration) -> (MockPanel, Fleet) {
        let (panel, fleet) = fleet_with(config);
        for i in 0..extra {
            let url = format!("https://n{i}.internal:2053");
            panel_node(&panel, &url);
            fleet.store().insert_node(new_node(&format!("N{i}"), &url)).unwrap();
        }
        for node in fleet.nodes() {
            panel.set_latency(&node.base_url, latency);
        }
        (panel, fleet)
    }

    fn identifiers(fleet: &Fleet, label: &str) -> Vec<Identifier> {
        fleet
            .credentials(label)
            .unwrap()
            .iter()
            .filter_map(|c| c.managed().map(|m| m.identifier))
            .collect()
    }

    #[tokio::test]
    async fn test_create_client_on_two_nodes() {
        let (panel, fleet) = fleet();

        let (client, outcomes) = fleet.create_client("alice", 0).await.unwrap();
        assert!(client.enabled);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Success));
        assert_eq!(outcomes[0].node_name, "A");
        assert_eq!(outcomes[1].node_name, "B");

        let rows = fleet.credentials("alice").unwrap();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].url, rows[1].url);
        assert!(rows[0].url.ends_with("#A-alice"));
        assert!(rows[1].url.ends_with("#B-alice"));

        let ids = identifiers(&fleet, "alice");
        assert_eq!(ids[0], ids[1]);
        assert_eq!(panel.find_client(URL_A, "alice").unwrap().1.id, ids[0].to_string());
    }

    #[tokio::test]
    async fn test_disable_keeps_identifier_and_flags_rows() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        let before = identifiers(&fleet, "alice");

        let outcomes = fleet.disable_client("alice").await.unwrap();
        assert!(outcomes.iter().all(NodeOutcome::is_success));

        let rows = fleet.credentials("alice").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|c| !c.enabled));
        assert!(!panel.find_client(URL_A, "alice").unwrap().1.enable);
        assert_eq!(identifiers(&fleet, "alice"), before);

        fleet.enable_client("alice").await.unwrap();
        assert!(fleet.credentials("alice").unwrap().iter().all(|c| c.enabled));
        assert_eq!(identifiers(&fleet, "alice"), before);
    }

    #[tokio::test]
    async fn test_rotation_mints_new_identifier() {
        let mut config = FleetConfig::default();
        config.reconcile.rotate_identifier = true;
        let (_panel, fleet) = fleet_with(&config);

        fleet.create_client("alice", 0).await.unwrap();
        let before = identifiers(&fleet, "alice");
        fleet.enable_client("alice").await.unwrap();
        let after = identifiers(&fleet, "alice");

        assert_ne!(before[0], after[0]);
        assert_eq!(after[0], after[1]);
        assert_eq!(fleet.credentials("alice").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_one_node_down_does_not_block_others() {
        let (panel, fleet) = fleet();
        panel.set_reachable(URL_B, false);

        let (_, outcomes) = fleet.create_client("alice", 0).await.unwrap();
        assert_eq!(outcomes[0].status, OutcomeStatus::Success);
        assert_eq!(outcomes[1].status, OutcomeStatus::Failed);
        assert_eq!(fleet.credentials("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_with_offline_node() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        panel.set_reachable(URL_B, false);

        let outcomes = fleet.revoke("alice").await.unwrap();
        assert_eq!(outcomes[0].status, OutcomeStatus::Success);
        assert_eq!(outcomes[1].status, OutcomeStatus::Degraded);
        assert!(fleet.credentials("alice").unwrap().is_empty());
        assert_eq!(panel.client_count(URL_A), 0);
    }

    #[tokio::test]
    async fn test_disabled_nodes_are_skipped() {
        let (panel, fleet) = fleet();
        fleet.set_node_enabled("B", false).unwrap();

        let (_, outcomes) = fleet.create_client("alice", 0).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(panel.client_count(URL_B), 0);
    }

    #[tokio::test]
    async fn test_add_node_backfills_with_existing_identifier() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        fleet.create_client("bob", 0).await.unwrap();
        let alice_id = identifiers(&fleet, "alice")[0];

        const URL_C: &str = "https://c.internal:2053";
        panel_node(&panel, URL_C);
        let (node, report) = fleet.add_node(new_node("C", URL_C)).await.unwrap();

        assert_eq!(node.name, "C");
        assert_eq!((report.succeeded, report.failed), (2, 0));
        assert_eq!(
            panel.find_client(URL_C, "alice").unwrap().1.id,
            alice_id.to_string()
        );
        assert!(identifiers(&fleet, "alice").iter().all(|id| *id == alice_id));
    }

    #[tokio::test]
    async fn test_backfill_counts_failures() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        panel.fail_adds(URL_A, true);

        let report = fleet.backfill_node("A").await.unwrap();
        assert_eq!((report.succeeded, report.failed), (0, 1));
        assert_eq!(report.outcomes[0].client, "alice");
        assert!(fleet.backfill_node("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_manual_credentials_survive_apply_and_revoke() {
        let (_panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        fleet
            .add_manual_credential("alice", " trojan://pw@legacy.example.com:443 ")
            .unwrap();

        fleet.disable_client("alice").await.unwrap();
        fleet.revoke("alice").await.unwrap();

        let rows = fleet.credentials("alice").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_manual());
        assert_eq!(rows[0].url, "trojan://pw@legacy.example.com:443");

        assert!(matches!(
            fleet.add_manual_credential("alice", "http://x"),
            Err(FleetError::Core(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_node_cascades() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        fleet.create_client("bob", 0).await.unwrap();

        let report = fleet.remove_node("A").await.unwrap();
        assert_eq!(report.revocations.len(), 2);
        assert_eq!(report.removed_credentials, 0);
        assert_eq!(panel.client_count(URL_A), 0);
        assert!(fleet.nodes().iter().all(|n| n.name != "A"));
        assert_eq!(fleet.credentials("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_unreachable_node() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        panel.set_reachable(URL_A, false);

        let report = fleet.remove_node("A").await.unwrap();
        assert_eq!(report.revocations[0].outcome.status, OutcomeStatus::Degraded);
        assert_eq!(fleet.nodes().len(), 1);
        assert_eq!(fleet.credentials("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_client() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        fleet.add_manual_credential("alice", "ss://abc@h:8388").unwrap();

        let (outcomes, removed) = fleet.delete_client("alice").await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(removed, 1);
        assert_eq!(panel.client_count(URL_A) + panel.client_count(URL_B), 0);
        assert!(fleet.credentials("alice").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_subscription() {
        let (_panel, fleet) = fleet();
        assert!(fleet.subscription("ghost").unwrap_err().is_not_found());

        fleet.store().insert_client("empty", true, 0).unwrap();
        assert!(matches!(
            fleet.subscription("empty"),
            Err(FleetError::NoCredentials(_))
        ));

        fleet.create_client("alice@mail.com", 0).await.unwrap();
        let sub = fleet.subscription("alice@mail.com").unwrap();
        assert_eq!(sub.link, "http://localhost:8001/sub/alice%40mail.com");
        assert_eq!(decode_bundle(&sub.bundle).unwrap(), sub.urls);
        assert_eq!(sub.urls.len(), 2);

        fleet.disable_client("alice@mail.com").await.unwrap();
        assert!(fleet.subscription("alice@mail.com").unwrap_err().is_forbidden());
    }

    #[tokio::test]
    async fn test_update_node_rewrites_urls() {
        let (_panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();

        let patch = NodePatch {
            domain: Some("vienna.example.com".to_string()),
            ..NodePatch::default()
        };
        let (node, rewritten) = fleet.update_node("A", patch).unwrap();
        assert_eq!(node.domain, "vienna.example.com");
        assert_eq!(rewritten, 1);
        assert!(fleet.credentials("alice").unwrap()[0]
            .url
            .contains("@vienna.example.com:443"));

        let bad = NodePatch {
            base_url: Some("ftp://x".to_string()),
            ..NodePatch::default()
        };
        assert!(matches!(
            fleet.update_node("A", bad),
            Err(FleetError::InvalidInput { field: "base_url", .. })
        ));
    }

    #[tokio::test]
    async fn test_connection_limit_pushed() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();

        let outcomes = fleet.set_connection_limit("alice", 2).await.unwrap();
        assert!(outcomes.iter().all(NodeOutcome::is_success));
        assert_eq!(panel.find_client(URL_A, "alice").unwrap().1.limit_ip, 2);
        assert_eq!(panel.find_client(URL_B, "alice").unwrap().1.limit_ip, 2);
        assert_eq!(fleet.clients()[0].limit_ip, 2);
    }

    #[tokio::test]
    async fn test_invalid_labels_rejected() {
        let (_panel, fleet) = fleet();
        assert!(fleet.create_client("", 0).await.is_err());
        assert!(fleet.create_client("a b", 0).await.is_err());
        fleet.create_client("alice", 0).await.unwrap();
        assert!(fleet.create_client("alice", 0).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_fleet_stats_and_audit() {
        let (panel, fleet) = fleet();
        fleet.create_client("alice", 0).await.unwrap();
        panel.set_reachable(URL_B, false);

        let stats = fleet.fleet_stats().await;
        assert_eq!(stats.len(), 2);
        assert!(stats[0].1.online);
        assert_eq!(stats[0].1.total_clients, 1);
        assert!(!stats[1].1.online);

        assert!(fleet.audit_node("A").await.unwrap().is_consistent());
        let err = fleet.audit_node("B").await.unwrap_err();
        assert!(matches!(err, FleetError::Reconcile { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_respects_max_concurrency() {
        let mut config = FleetConfig::default();
        config.reconcile.max_concurrency = 2;
        let (panel, fleet) = slow_fleet(&config, 4, Duration::from_secs(1));

        let (_, outcomes) = fleet.create_client("alice", 0).await.unwrap();
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Success));
        assert_eq!(panel.peak_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_nodes_run_side_by_side() {
        let (panel, fleet) = slow_fleet(&FleetConfig::default(), 3, Duration::from_secs(10));

        let start = tokio::time::Instant::now();
        let (_, outcomes) = fleet.create_client("alice", 0).await.unwrap();
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(NodeOutcome::is_success));
        assert!(start.elapsed() < Duration::from_secs(20));
        assert_eq!(panel.peak_in_flight(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_apply_finishes_started_nodes() {
        let (_panel, fleet) = slow_fleet(&FleetConfig::default(), 0, Duration::from_secs(1));
        fleet.store().insert_client("alice", true, 0).unwrap();

        let cut_short = tokio::time::timeout(Duration::from_millis(1), fleet.apply("alice", true)).await;
        assert!(cut_short.is_err());
        assert!(fleet.credentials("alice").unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        let rows = fleet.credentials("alice").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|c| c.enabled));
    }
}
