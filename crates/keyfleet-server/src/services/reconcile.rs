// ============================================
// File: crates/keyfleet-server/src/services/reconcile.rs
// ============================================
//! # Reconciliation Engine (per node)
//!
//! ## Creation Reason
//! Converges one node's remote client entries with the local ledger for
//! one client. Fleet-wide operations are built from these steps.
//!
//! ## Main Functionality
//! - `sync`: Push a client's entry (delete-then-add) and record the credential
//! - `revoke`: Remove a client's entries and always clear the ledger rows
//! - `push_limit`: Rewrite the connection limit on existing entries
//! - `audit`: Compare ledger rows with what the node actually has
//!
//! ## Sync Flow
//! ```text
//! login ─► list inbounds ─► primary? ─no─► fail "primary inbound not found"
//!                              │
//!                              ▼
//!               label present? ─yes─► delete (errors tolerated)
//!                              │
//!                              ▼
//!                  add entry ─► synthesize URL ─► upsert ledger row
//!                              │
//!                              ▼
//!          secondary inbound? ─yes─► same with sub-label (failures logged)
//!                              │
//!                              ▼
//!                    invalidate node stats
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every step returns a `NodeOutcome`; nothing here may panic or bubble
//!   an error past the node boundary
//! - Revocation clears the ledger even if the node never answered, and
//!   tries every transport's delete even when another one failed
//! - A sync that doesn't (re)issue the secondary transport drops its old
//!   ledger row
//! - Sessions are opened per step and dropped at the end of it
//!
//! ## Last Modified
//! v0.1.0 - Initial reconciliation engine

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use keyfleet_common::{Identifier, NodeId};
use keyfleet_core::{build_url, credential_label, TransportProfile};
use keyfleet_panel::{Inbound, PanelClient, PanelConnector, PanelSession, Removal};

use crate::config::InboundsConfig;
use crate::error::ReconcileError;
use crate::services::stats::StatsCache;
use crate::store::{Client, Managed, Node, Store};

// ============================================
// NodeOutcome
// ============================================

/// How a per-node step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Fully applied.
    Success,
    /// Applied locally; the remote side may be incomplete.
    Degraded,
    /// Not applied.
    Failed,
}

/// Result of one per-node step, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    /// Node the step ran against.
    pub node_id: NodeId,
    /// Node display name.
    pub node_name: String,
    /// How it ended.
    pub status: OutcomeStatus,
    /// Human-readable detail.
    pub detail: String,
    /// `true` if the failure was transient and the step may be re-run.
    pub retryable: bool,
}

impl NodeOutcome {
    /// Successful outcome.
    pub fn success(node: &Node, detail: impl Into<String>) -> Self {
        Self::with_status(node, OutcomeStatus::Success, detail)
    }

    /// Degraded-success outcome.
    pub fn degraded(node: &Node, detail: impl Into<String>) -> Self {
        Self::with_status(node, OutcomeStatus::Degraded, detail)
    }

    /// Failed outcome.
    pub fn failed(node: &Node, detail: impl Into<String>) -> Self {
        Self::with_status(node, OutcomeStatus::Failed, detail)
    }

    /// Failed outcome carrying the error's retry hint.
    pub fn from_error(node: &Node, error: &ReconcileError) -> Self {
        Self {
            retryable: error.is_retryable(),
            ..Self::failed(node, error.to_string())
        }
    }

    fn with_status(node: &Node, status: OutcomeStatus, detail: impl Into<String>) -> Self {
        Self {
            node_id: node.id,
            node_name: node.name.clone(),
            status,
            detail: detail.into(),
            retryable: false,
        }
    }

    /// Returns `true` for `Success` and `Degraded`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success | OutcomeStatus::Degraded)
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self.status {
            OutcomeStatus::Success => "ok",
            OutcomeStatus::Degraded => "degraded",
            OutcomeStatus::Failed => "failed",
        };
        write!(f, "{} [{mark}] {}", self.node_name, self.detail)
    }
}

// ============================================
// DriftReport
// ============================================

/// Differences between the ledger and a node's client entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Labels the ledger expects but the node doesn't have.
    pub missing_remotely: Vec<String>,
    /// Labels on the node that the ledger doesn't know.
    pub unknown_remotely: Vec<String>,
}

impl DriftReport {
    /// Returns `true` if ledger and node agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing_remotely.is_empty() && self.unknown_remotely.is_empty()
    }
}

// ============================================
// Reconciler
// ============================================

/// Per-node reconciliation steps.
pub struct Reconciler {
    store: Arc<Store>,
    stats: Arc<StatsCache>,
    connector: Arc<dyn PanelConnector>,
    inbounds: InboundsConfig,
}

impl Reconciler {
    /// Creates a reconciler.
    pub fn new(
        store: Arc<Store>,
        stats: Arc<StatsCache>,
        connector: Arc<dyn PanelConnector>,
        inbounds: InboundsConfig,
    ) -> Self {
        Self {
            store,
            stats,
            connector,
            inbounds,
        }
    }

    /// Provisions `client` on `node` under `identifier`.
    ///
    /// Safe to retry: an existing entry is deleted before the add.
    pub async fn sync(&self, node: &Node, client: &Client, identifier: Identifier) -> NodeOutcome {
        match self.try_sync(node, client, identifier).await {
            Ok(detail) => {
                self.stats.invalidate(node.id);
                info!(node = %node.name, client = %client.label, enabled = client.enabled, "Client synced");
                NodeOutcome::success(node, detail)
            }
            Err(e) => {
                warn!(node = %node.name, client = %client.label, error = %e, "Sync failed");
                NodeOutcome::from_error(node, &e)
            }
        }
    }

    async fn try_sync(
        &self,
        node: &Node,
        client: &Client,
        identifier: Identifier,
    ) -> Result<String, ReconcileError> {
        let session = self
            .connector
            .connect(&node.endpoint())
            .await
            .map_err(ReconcileError::Authentication)?;
        let inbounds = session.list_inbounds().await.map_err(ReconcileError::Remote)?;
        let primary = self
            .inbounds
            .find_primary(&inbounds)
            .ok_or(ReconcileError::PrimaryInboundNotFound)?;

        self.push_entry(
            session.as_ref(),
            node,
            client,
            identifier,
            primary,
            self.inbounds.primary_profile,
        )
        .await?;

        let profile = self.inbounds.secondary_profile;
        let Some(secondary) = self.inbounds.find_secondary(&inbounds) else {
            self.drop_stale(node, client, profile)?;
            return Ok("synced".to_string());
        };

        match self
            .push_entry(session.as_ref(), node, client, identifier, secondary, profile)
            .await
        {
            Ok(()) => Ok(format!("synced (+{profile})")),
            Err(e) => {
                warn!(
                    node = %node.name,
                    client = %client.label,
                    profile = %profile,
                    error = %e,
                    "Secondary transport sync failed, ignoring"
                );
                self.drop_stale(node, client, profile)?;
                Ok(format!("synced ({profile} skipped: {e})"))
            }
        }
    }

    /// Drops a ledger row for a transport this sync didn't (re)issue.
    fn drop_stale(
        &self,
        node: &Node,
        client: &Client,
        profile: TransportProfile,
    ) -> Result<(), ReconcileError> {
        let dropped = self.store.remove_managed_profile(client.id, node.id, profile)?;
        if dropped > 0 {
            info!(node = %node.name, client = %client.label, profile = %profile, "Dropped stale credential");
        }
        Ok(())
    }

    async fn push_entry(
        &self,
        session: &dyn PanelSession,
        node: &Node,
        client: &Client,
        identifier: Identifier,
        inbound: &Inbound,
        profile: TransportProfile,
    ) -> Result<(), ReconcileError> {
        let remote_label = profile.remote_label(&client.label);

        if inbound.has_client(&remote_label) {
            match session.delete_client(inbound.id, &remote_label).await {
                Ok(removal) => {
                    debug!(node = %node.name, label = %remote_label, ?removal, "Replaced existing entry");
                }
                Err(e) => {
                    debug!(node = %node.name, label = %remote_label, error = %e, "Pre-add delete failed, continuing");
                }
            }
        }

        let entry = PanelClient::new(
            identifier.to_string(),
            &remote_label,
            client.enabled,
            client.limit_ip,
        );
        session
            .add_client(inbound.id, &entry)
            .await
            .map_err(ReconcileError::Remote)?;

        let url = build_url(
            &node.domain,
            identifier,
            &credential_label(&node.name, &client.label),
            profile,
        );
        self.store.upsert_managed(
            client.id,
            Managed {
                node_id: node.id,
                inbound_id: inbound.id,
                identifier,
                remote_label,
                profile,
            },
            url,
            client.enabled,
        )?;
        Ok(())
    }

    /// Removes `client` from `node` and clears its ledger rows there.
    ///
    /// The ledger is cleared whatever the node says. If the node could not
    /// be worked with, the outcome is `Degraded`.
    pub async fn revoke(&self, node: &Node, client: &Client) -> NodeOutcome {
        let remote = self.try_revoke(node, client).await;

        let removed = match self.store.remove_managed(client.id, node.id) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(node = %node.name, client = %client.label, error = %e, "Ledger cleanup failed");
                return NodeOutcome::failed(node, ReconcileError::Ledger(e).to_string());
            }
        };

        match remote {
            Ok(detail) => {
                self.stats.invalidate(node.id);
                info!(node = %node.name, client = %client.label, credentials = removed, "Client revoked");
                NodeOutcome::success(node, detail)
            }
            Err(e) => {
                warn!(
                    node = %node.name,
                    client = %client.label,
                    error = %e,
                    "Remote revocation incomplete, ledger cleared"
                );
                NodeOutcome::degraded(
                    node,
                    format!("deleted locally; remote cleanup may be incomplete ({e})"),
                )
            }
        }
    }

    async fn try_revoke(&self, node: &Node, client: &Client) -> Result<String, ReconcileError> {
        let session = self
            .connector
            .connect(&node.endpoint())
            .await
            .map_err(ReconcileError::Authentication)?;
        let inbounds = session.list_inbounds().await.map_err(ReconcileError::Remote)?;

        let targets = [
            (self.inbounds.find_primary(&inbounds), self.inbounds.primary_profile),
            (self.inbounds.find_secondary(&inbounds), self.inbounds.secondary_profile),
        ];

        let mut removed = false;
        let mut first_error = None;
        for (inbound, profile) in targets {
            let Some(inbound) = inbound else { continue };
            let label = profile.remote_label(&client.label);
            match session.delete_client(inbound.id, &label).await {
                Ok(Removal::Removed) => removed = true,
                Ok(Removal::Absent) => {}
                Err(e) => {
                    warn!(node = %node.name, label = %label, error = %e, "Remote delete failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(ReconcileError::Remote(e));
        }
        Ok(if removed { "removed" } else { "already absent" }.to_string())
    }

    /// Rewrites the connection limit on the client's existing entries.
    pub async fn push_limit(&self, node: &Node, client: &Client) -> NodeOutcome {
        match self.try_push_limit(node, client).await {
            Ok(updated) => {
                self.stats.invalidate(node.id);
                NodeOutcome::success(node, format!("limit {} set on {updated} entries", client.limit_ip))
            }
            Err(e) => {
                warn!(node = %node.name, client = %client.label, error = %e, "Limit update failed");
                NodeOutcome::from_error(node, &e)
            }
        }
    }

    async fn try_push_limit(&self, node: &Node, client: &Client) -> Result<usize, ReconcileError> {
        let session = self
            .connector
            .connect(&node.endpoint())
            .await
            .map_err(ReconcileError::Authentication)?;
        let inbounds = session.list_inbounds().await.map_err(ReconcileError::Remote)?;
        let primary = self
            .inbounds
            .find_primary(&inbounds)
            .ok_or(ReconcileError::PrimaryInboundNotFound)?;

        let mut targets = vec![(primary.id, self.inbounds.primary_profile)];
        if let Some(secondary) = self.inbounds.find_secondary(&inbounds) {
            targets.push((secondary.id, self.inbounds.secondary_profile));
        }

        let mut updated = 0;
        for (inbound_id, profile) in targets {
            let label = profile.remote_label(&client.label);
            let mut inbound = session
                .get_inbound(inbound_id)
                .await
                .map_err(ReconcileError::Remote)?;
            let mut settings = inbound.parse_settings().map_err(ReconcileError::Remote)?;

            let mut changed = 0;
            for entry in settings.clients.iter_mut().filter(|c| c.email == label) {
                entry.limit_ip = client.limit_ip;
                changed += 1;
            }
            if changed == 0 {
                continue;
            }

            inbound.set_settings(&settings).map_err(ReconcileError::Remote)?;
            session
                .update_inbound(&inbound)
                .await
                .map_err(ReconcileError::Remote)?;
            updated += changed;
        }
        Ok(updated)
    }

    /// Compares the ledger's rows for `node` with its remote entries.
    ///
    /// # Errors
    /// Returns `Authentication`, `Remote` or `PrimaryInboundNotFound` if the
    /// node's entries can't be read.
    pub async fn audit(&self, node: &Node) -> Result<DriftReport, ReconcileError> {
        let session = self
            .connector
            .connect(&node.endpoint())
            .await
            .map_err(ReconcileError::Authentication)?;
        let inbounds = session.list_inbounds().await.map_err(ReconcileError::Remote)?;
        let primary = self
            .inbounds
            .find_primary(&inbounds)
            .ok_or(ReconcileError::PrimaryInboundNotFound)?;

        let mut remote = BTreeSet::new();
        for inbound in std::iter::once(primary).chain(self.inbounds.find_secondary(&inbounds)) {
            let settings = inbound.parse_settings().map_err(ReconcileError::Remote)?;
            remote.extend(settings.clients.into_iter().map(|c| (inbound.id, c.email)));
        }

        let expected: BTreeSet<(u64, String)> = self
            .store
            .credentials_on_node(node.id)
            .into_iter()
            .filter_map(|c| c.managed().map(|m| (m.inbound_id, m.remote_label.clone())))
            .collect();

        let report = DriftReport {
            missing_remotely: expected.difference(&remote).map(|(_, l)| l.clone()).collect(),
            unknown_remotely: remote.difference(&expected).map(|(_, l)| l.clone()).collect(),
        };
        if !report.is_consistent() {
            warn!(
                node = %node.name,
                missing = report.missing_remotely.len(),
                unknown = report.unknown_remotely.len(),
                "Ledger and node disagree"
            );
        }
        Ok(report)
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("inbounds", &self.inbounds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyfleet_panel::MockPanel;

    use crate::config::StatsConfig;
    use crate::store::NewNode;

    const URL: &str = "https://a.internal:2053";

    struct Harness {
        panel: MockPanel,
        store: Arc<Store>,
        stats: Arc<StatsCache>,
        reconciler: Reconciler,
        node: Node,
        client: Client,
        primary: u64,
        secondary: u64,
    }

    fn harness() -> Harness {
        let panel = MockPanel::new();
        panel.add_node(URL, "admin", "pw");
        let primary = panel.add_inbound(URL, "vless", "vless-grpc");
        let secondary = panel.add_inbound(URL, "vless", "vless-xhttp");

        let store = Arc::new(Store::in_memory());
        let node = store
            .insert_node(NewNode {
                name: "A".to_string(),
                base_url: URL.to_string(),
                domain: "a.example.com".to_string(),
                username: "admin".to_string(),
                password: "pw".to_string(),
            })
            .unwrap();
        let client = store.insert_client("alice", true, 0).unwrap();

        let connector: Arc<dyn PanelConnector> = Arc::new(panel.clone());
        let stats = Arc::new(StatsCache::new(
            Arc::clone(&connector),
            InboundsConfig::default(),
            &StatsConfig::default(),
        ));
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&stats),
            connector,
            InboundsConfig::default(),
        );

        Harness {
            panel,
            store,
            stats,
            reconciler,
            node,
            client,
            primary,
            secondary,
        }
    }

    #[tokio::test]
    async fn test_sync_provisions_both_transports() {
        let h = harness();
        let id = Identifier::generate();

        let outcome = h.reconciler.sync(&h.node, &h.client, id).await;
        assert_eq!(outcome.status, OutcomeStatus::Success, "{outcome}");

        let (_, entry) = h.panel.find_client(URL, "alice").unwrap();
        assert_eq!(entry.id, id.to_string());
        assert!(entry.enable);
        assert_eq!(h.panel.clients(URL, h.secondary)[0].email, "alice-xhttp");

        let rows = h.store.credentials_for_client(h.client.id);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].url,
            format!("vless://{id}@a.example.com:443?encryption=none&security=tls&type=grpc&serviceName=sync#A-alice")
        );
        assert_eq!(
            rows[1].url,
            format!("vless://{id}@a.example.com:443?encryption=none&security=tls&type=xhttp&path=%2Fsync&mode=auto#A-alice-xhttp")
        );
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let h = harness();
        let id = Identifier::generate();

        h.reconciler.sync(&h.node, &h.client, id).await;
        let rows_once = h.store.credentials_for_client(h.client.id);
        let remote_once = h.panel.clients(URL, h.primary);

        let outcome = h.reconciler.sync(&h.node, &h.client, id).await;
        assert!(outcome.is_success());

        let rows_twice = h.store.credentials_for_client(h.client.id);
        assert_eq!(rows_twice.len(), rows_once.len());
        assert_eq!(rows_twice[0].id, rows_once[0].id);
        assert_eq!(rows_twice[0].url, rows_once[0].url);
        assert_eq!(h.panel.clients(URL, h.primary), remote_once);
        assert!(h
            .panel
            .calls(URL)
            .contains(&format!("delete:{}:alice", h.primary)));
    }

    #[tokio::test]
    async fn test_sync_without_primary_inbound() {
        let h = harness();
        h.panel.remove_inbound(URL, h.primary);

        let outcome = h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.detail, "primary inbound not found");
        assert!(!outcome.retryable);
        assert!(h.store.credentials_for_client(h.client.id).is_empty());
    }

    #[tokio::test]
    async fn test_sync_unreachable_node() {
        let h = harness();
        h.panel.set_reachable(URL, false);

        let outcome = h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.detail.starts_with("authentication failed"));
        assert!(outcome.retryable);
    }

    #[tokio::test]
    async fn test_add_failure_is_remote_failure() {
        let h = harness();
        h.panel.fail_adds(URL, true);

        let outcome = h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.detail.starts_with("remote call failed"));
        assert!(h.store.credentials_for_client(h.client.id).is_empty());
    }

    #[tokio::test]
    async fn test_missing_secondary_is_skipped() {
        let h = harness();
        h.panel.remove_inbound(URL, h.secondary);
        let outcome = h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.detail, "synced");
        assert_eq!(h.store.credentials_for_client(h.client.id).len(), 1);
    }

    #[tokio::test]
    async fn test_resync_drops_credential_for_removed_secondary() {
        let h = harness();
        let id = Identifier::generate();
        h.reconciler.sync(&h.node, &h.client, id).await;
        assert_eq!(h.store.credentials_for_client(h.client.id).len(), 2);

        h.panel.remove_inbound(URL, h.secondary);
        let client = h.store.set_client_enabled(h.client.id, false).unwrap();
        let outcome = h.reconciler.sync(&h.node, &client, id).await;
        assert_eq!(outcome.status, OutcomeStatus::Success, "{outcome}");

        let rows = h.store.credentials_for_client(h.client.id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].managed().unwrap().profile, TransportProfile::Grpc);
        assert!(rows.iter().all(|c| !c.enabled));
    }

    #[tokio::test]
    async fn test_revoke_clears_ledger() {
        let h = harness();
        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;

        let outcome = h.reconciler.revoke(&h.node, &h.client).await;
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.detail, "removed");
        assert_eq!(h.panel.client_count(URL), 0);
        assert!(h.store.credentials_for_client(h.client.id).is_empty());

        let outcome = h.reconciler.revoke(&h.node, &h.client).await;
        assert_eq!(outcome.detail, "already absent");
    }

    #[tokio::test]
    async fn test_revoke_without_primary_still_removes_secondary() {
        let h = harness();
        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        h.panel.remove_inbound(URL, h.primary);

        let outcome = h.reconciler.revoke(&h.node, &h.client).await;
        assert_eq!(outcome.status, OutcomeStatus::Success, "{outcome}");
        assert_eq!(outcome.detail, "removed");
        assert!(h.panel.clients(URL, h.secondary).is_empty());
        assert!(h.store.credentials_for_client(h.client.id).is_empty());
    }

    #[tokio::test]
    async fn test_revoke_attempts_both_deletes_when_primary_fails() {
        let h = harness();
        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        h.panel.fail_deletes(URL, true);

        let outcome = h.reconciler.revoke(&h.node, &h.client).await;
        assert_eq!(outcome.status, OutcomeStatus::Degraded, "{outcome}");
        let calls = h.panel.calls(URL);
        assert!(calls.contains(&format!("delete:{}:alice", h.primary)));
        assert!(calls.contains(&format!("delete:{}:alice-xhttp", h.secondary)));
        assert!(h.store.credentials_for_client(h.client.id).is_empty());
    }

    #[tokio::test]
    async fn test_revoke_offline_node_is_degraded() {
        let h = harness();
        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        h.panel.set_reachable(URL, false);

        let outcome = h.reconciler.revoke(&h.node, &h.client).await;
        assert_eq!(outcome.status, OutcomeStatus::Degraded);
        assert!(outcome.is_success());
        assert!(outcome.detail.starts_with("deleted locally; remote cleanup may be incomplete"));
        assert!(h.store.credentials_for_client(h.client.id).is_empty());
    }

    #[tokio::test]
    async fn test_revoke_keeps_manual_credentials() {
        let h = harness();
        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        h.store.add_manual(h.client.id, "trojan://pw@x:443").unwrap();

        h.reconciler.revoke(&h.node, &h.client).await;
        let rows = h.store.credentials_for_client(h.client.id);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_manual());
    }

    #[tokio::test]
    async fn test_sync_invalidates_stats() {
        let h = harness();
        h.stats.get(&h.node).await;
        assert!(h.stats.contains(h.node.id));

        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        assert!(!h.stats.contains(h.node.id));
    }

    #[tokio::test]
    async fn test_push_limit() {
        let h = harness();
        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        let client = h.store.set_connection_limit(h.client.id, 3).unwrap();

        let outcome = h.reconciler.push_limit(&h.node, &client).await;
        assert_eq!(outcome.status, OutcomeStatus::Success, "{outcome}");
        assert_eq!(h.panel.clients(URL, h.primary)[0].limit_ip, 3);
        assert_eq!(h.panel.clients(URL, h.secondary)[0].limit_ip, 3);
    }

    #[tokio::test]
    async fn test_audit_reports_drift() {
        let h = harness();
        h.reconciler.sync(&h.node, &h.client, Identifier::generate()).await;
        assert!(h.reconciler.audit(&h.node).await.unwrap().is_consistent());

        h.panel
            .insert_client(URL, h.primary, PanelClient::new("x", "stranger", true, 0));
        let session = h.panel.connect(&h.node.endpoint()).await.unwrap();
        session.delete_client(h.secondary, "alice-xhttp").await.unwrap();

        let report = h.reconciler.audit(&h.node).await.unwrap();
        assert_eq!(report.missing_remotely, vec!["alice-xhttp".to_string()]);
        assert_eq!(report.unknown_remotely, vec!["stranger".to_string()]);
    }
}
