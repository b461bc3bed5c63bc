// ============================================
// File: crates/keyfleet-panel/src/mock.rs
// ============================================
//! # Mock Panel Fleet
//!
//! ## Creation Reason
//! Provides an in-memory fleet of panels for testing the reconciliation
//! engine without network access.
//!
//! ## Main Functionality
//! - Nodes keyed by base URL, each with credentials and inbounds
//! - Reachability, add/delete failure switches and login latency per node
//! - Call journal, login counter and peak concurrent logins for assertions
//! - Per-client statistics that tests can move forward
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - Cloning a `MockPanel` shares state; sessions see later switches
//! - Duplicate labels within one inbound are rejected like a real panel
//! - Latency is a `tokio::time::sleep`, so paused-clock tests run instantly
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{PanelError, Result};
use crate::models::{ClientStat, Inbound, PanelClient};
use crate::traits::{NodeEndpoint, PanelConnector, PanelSession, Removal};

// ============================================
// State
// ============================================

#[derive(Debug)]
struct MockNode {
    username: String,
    password: String,
    reachable: bool,
    fail_adds: bool,
    fail_deletes: bool,
    latency: Duration,
    logins: u32,
    calls: Vec<String>,
    inbounds: Vec<Inbound>,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: HashMap<String, MockNode>,
    next_inbound_id: u64,
    in_flight: usize,
    peak_in_flight: usize,
}

impl MockState {
    fn node_mut(&mut self, base_url: &str) -> &mut MockNode {
        self.nodes
            .get_mut(base_url.trim_end_matches('/'))
            .unwrap_or_else(|| panic!("mock node {base_url} not registered"))
    }

    fn node(&self, base_url: &str) -> &MockNode {
        self.nodes
            .get(base_url.trim_end_matches('/'))
            .unwrap_or_else(|| panic!("mock node {base_url} not registered"))
    }
}

// ============================================
// MockPanel
// ============================================

/// In-memory panel fleet implementing [`PanelConnector`].
#[derive(Debug, Clone, Default)]
pub struct MockPanel {
    state: Arc<Mutex<MockState>>,
}

impl MockPanel {
    /// Creates an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reachable node with no inbounds.
    pub fn add_node(&self, base_url: &str, username: &str, password: &str) {
        self.state.lock().nodes.insert(
            base_url.trim_end_matches('/').to_string(),
            MockNode {
                username: username.to_string(),
                password: password.to_string(),
                reachable: true,
                fail_adds: false,
                fail_deletes: false,
                latency: Duration::ZERO,
                logins: 0,
                calls: Vec::new(),
                inbounds: Vec::new(),
            },
        );
    }

    /// Adds an inbound to a node and returns its id.
    pub fn add_inbound(&self, base_url: &str, protocol: &str, remark: &str) -> u64 {
        let mut state = self.state.lock();
        state.next_inbound_id += 1;
        let id = state.next_inbound_id;
        let mut inbound = Inbound::new(id, protocol, remark);
        inbound.settings = r#"{"clients":[],"decryption":"none"}"#.to_string();
        inbound.client_stats = Some(Vec::new());
        state.node_mut(base_url).inbounds.push(inbound);
        id
    }

    /// Removes an inbound from a node.
    pub fn remove_inbound(&self, base_url: &str, inbound_id: u64) {
        self.state
            .lock()
            .node_mut(base_url)
            .inbounds
            .retain(|i| i.id != inbound_id);
    }

    /// Makes a node (un)reachable, including for already open sessions.
    pub fn set_reachable(&self, base_url: &str, reachable: bool) {
        self.state.lock().node_mut(base_url).reachable = reachable;
    }

    /// Makes every add-client call on a node fail.
    pub fn fail_adds(&self, base_url: &str, fail: bool) {
        self.state.lock().node_mut(base_url).fail_adds = fail;
    }

    /// Makes every delete-client call on a node fail after being journaled.
    pub fn fail_deletes(&self, base_url: &str, fail: bool) {
        self.state.lock().node_mut(base_url).fail_deletes = fail;
    }

    /// Delays every login on a node by `latency`.
    pub fn set_latency(&self, base_url: &str, latency: Duration) {
        self.state.lock().node_mut(base_url).latency = latency;
    }

    /// Highest number of logins that were in progress at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().peak_in_flight
    }

    /// Places a client entry directly, bypassing the journal.
    pub fn insert_client(&self, base_url: &str, inbound_id: u64, client: PanelClient) {
        let mut state = self.state.lock();
        let node = state.node_mut(base_url);
        if let Some(inbound) = node.inbounds.iter_mut().find(|i| i.id == inbound_id) {
            insert_entry(inbound, client).unwrap_or_else(|e| panic!("insert_client: {e}"));
        }
    }

    /// Returns the client entries of one inbound.
    #[must_use]
    pub fn clients(&self, base_url: &str, inbound_id: u64) -> Vec<PanelClient> {
        let state = self.state.lock();
        state
            .node(base_url)
            .inbounds
            .iter()
            .find(|i| i.id == inbound_id)
            .and_then(|i| i.parse_settings().ok())
            .map(|s| s.clients)
            .unwrap_or_default()
    }

    /// Returns the entry labelled `label` on any inbound of a node.
    #[must_use]
    pub fn find_client(&self, base_url: &str, label: &str) -> Option<(u64, PanelClient)> {
        let state = self.state.lock();
        state.node(base_url).inbounds.iter().find_map(|inbound| {
            inbound
                .parse_settings()
                .ok()?
                .clients
                .into_iter()
                .find(|c| c.email == label)
                .map(|c| (inbound.id, c))
        })
    }

    /// Total number of client entries on a node.
    #[must_use]
    pub fn client_count(&self, base_url: &str) -> usize {
        let state = self.state.lock();
        state
            .node(base_url)
            .inbounds
            .iter()
            .filter_map(|i| i.parse_settings().ok())
            .map(|s| s.clients.len())
            .sum()
    }

    /// Sets the last-seen timestamp (ms) of every stat row labelled `label`.
    pub fn set_last_online(&self, base_url: &str, label: &str, last_online_ms: i64) {
        self.update_stats(base_url, label, |stat| stat.last_online = last_online_ms);
    }

    /// Sets traffic counters of every stat row labelled `label`.
    pub fn set_traffic(&self, base_url: &str, label: &str, up: u64, down: u64) {
        self.update_stats(base_url, label, |stat| {
            stat.up = up;
            stat.down = down;
        });
    }

    /// Sets the inbound-level traffic counters.
    pub fn set_inbound_traffic(&self, base_url: &str, inbound_id: u64, up: u64, down: u64) {
        let mut state = self.state.lock();
        if let Some(inbound) = state
            .node_mut(base_url)
            .inbounds
            .iter_mut()
            .find(|i| i.id == inbound_id)
        {
            inbound.up = up;
            inbound.down = down;
        }
    }

    /// Number of successful logins on a node.
    #[must_use]
    pub fn login_count(&self, base_url: &str) -> u32 {
        self.state.lock().node(base_url).logins
    }

    /// Journal of mutating calls on a node (`add:{inbound}:{label}`,
    /// `delete:{inbound}:{label}`, `update:{inbound}`).
    #[must_use]
    pub fn calls(&self, base_url: &str) -> Vec<String> {
        self.state.lock().node(base_url).calls.clone()
    }

    /// Clears the call journal of every node.
    pub fn clear_calls(&self) {
        for node in self.state.lock().nodes.values_mut() {
            node.calls.clear();
        }
    }

    fn update_stats(&self, base_url: &str, label: &str, mut apply: impl FnMut(&mut ClientStat)) {
        let mut state = self.state.lock();
        for inbound in &mut state.node_mut(base_url).inbounds {
            for stat in inbound.client_stats.iter_mut().flatten() {
                if stat.email == label {
                    apply(stat);
                }
            }
        }
    }
}

fn insert_entry(inbound: &mut Inbound, client: PanelClient) -> Result<()> {
    let mut settings = inbound.parse_settings()?;
    if settings.clients.iter().any(|c| c.email == client.email) {
        return Err(PanelError::Rejected {
            operation: "add client",
            message: format!("Duplicate email: {}", client.email),
        });
    }
    inbound
        .client_stats
        .get_or_insert_with(Vec::new)
        .push(ClientStat {
            email: client.email.clone(),
            last_online: 0,
            enable: client.enable,
            up: 0,
            down: 0,
        });
    settings.clients.push(client);
    inbound.set_settings(&settings)
}

/// Counts one login as in progress until dropped.
struct InFlight(Arc<Mutex<MockState>>);

impl InFlight {
    fn enter(state: &Arc<Mutex<MockState>>) -> Self {
        let mut guard = state.lock();
        guard.in_flight += 1;
        guard.peak_in_flight = guard.peak_in_flight.max(guard.in_flight);
        Self(Arc::clone(state))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}

#[async_trait]
impl PanelConnector for MockPanel {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Box<dyn PanelSession>> {
        let _in_flight = InFlight::enter(&self.state);
        let latency = self
            .state
            .lock()
            .nodes
            .get(&endpoint.base_url)
            .map_or(Duration::ZERO, |node| node.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        let Some(node) = state.nodes.get_mut(&endpoint.base_url) else {
            return Err(PanelError::unreachable(&endpoint.name, "connection refused"));
        };
        if !node.reachable {
            return Err(PanelError::unreachable(&endpoint.name, "connection timed out"));
        }
        if node.username != endpoint.username || node.password != endpoint.password {
            return Err(PanelError::authentication_failed(&endpoint.name, "wrong credentials"));
        }
        node.logins += 1;

        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            base_url: endpoint.base_url.clone(),
            name: endpoint.name.clone(),
        }))
    }
}

// ============================================
// MockSession
// ============================================

struct MockSession {
    state: Arc<Mutex<MockState>>,
    base_url: String,
    name: String,
}

impl MockSession {
    fn with_node<T>(&self, f: impl FnOnce(&mut MockNode) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&self.base_url)
            .ok_or_else(|| PanelError::unreachable(&self.name, "node removed"))?;
        if !node.reachable {
            return Err(PanelError::unreachable(&self.name, "connection reset"));
        }
        f(node)
    }
}

#[async_trait]
impl PanelSession for MockSession {
    async fn list_inbounds(&self) -> Result<Vec<Inbound>> {
        self.with_node(|node| Ok(node.inbounds.clone()))
    }

    async fn add_client(&self, inbound_id: u64, client: &PanelClient) -> Result<()> {
        self.with_node(|node| {
            node.calls.push(format!("add:{inbound_id}:{}", client.email));
            if node.fail_adds {
                return Err(PanelError::Rejected {
                    operation: "add client",
                    message: "simulated failure".to_string(),
                });
            }
            let inbound = node
                .inbounds
                .iter_mut()
                .find(|i| i.id == inbound_id)
                .ok_or_else(|| PanelError::Rejected {
                    operation: "add client",
                    message: format!("inbound {inbound_id} not found"),
                })?;
            insert_entry(inbound, client.clone())
        })
    }

    async fn delete_client(&self, inbound_id: u64, label: &str) -> Result<Removal> {
        self.with_node(|node| {
            node.calls.push(format!("delete:{inbound_id}:{label}"));
            if node.fail_deletes {
                return Err(PanelError::unreachable(&self.name, "connection reset"));
            }
            let Some(inbound) = node.inbounds.iter_mut().find(|i| i.id == inbound_id) else {
                return Ok(Removal::Absent);
            };
            let mut settings = inbound.parse_settings()?;
            let before = settings.clients.len();
            settings.clients.retain(|c| c.email != label);
            if settings.clients.len() == before {
                return Ok(Removal::Absent);
            }
            if let Some(stats) = inbound.client_stats.as_mut() {
                stats.retain(|s| s.email != label);
            }
            inbound.set_settings(&settings)?;
            Ok(Removal::Removed)
        })
    }

    async fn get_inbound(&self, inbound_id: u64) -> Result<Inbound> {
        self.with_node(|node| {
            node.inbounds
                .iter()
                .find(|i| i.id == inbound_id)
                .cloned()
                .ok_or(PanelError::InboundNotFound(inbound_id))
        })
    }

    async fn update_inbound(&self, inbound: &Inbound) -> Result<()> {
        self.with_node(|node| {
            node.calls.push(format!("update:{}", inbound.id));
            let existing = node
                .inbounds
                .iter_mut()
                .find(|i| i.id == inbound.id)
                .ok_or(PanelError::InboundNotFound(inbound.id))?;
            let stats = existing.client_stats.take();
            *existing = inbound.clone();
            existing.client_stats = stats;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://10.0.0.1:2053";

    fn fleet() -> (MockPanel, NodeEndpoint, u64) {
        let panel = MockPanel::new();
        panel.add_node(URL, "admin", "pw");
        let id = panel.add_inbound(URL, "vless", "vless-grpc");
        (panel, NodeEndpoint::new("a", URL, "admin", "pw"), id)
    }

    #[tokio::test]
    async fn test_add_and_delete() {
        let (panel, endpoint, id) = fleet();
        let session = panel.connect(&endpoint).await.unwrap();

        session.add_client(id, &PanelClient::new("u1", "a-alice", true, 0)).await.unwrap();
        assert_eq!(panel.clients(URL, id).len(), 1);
        assert_eq!(panel.find_client(URL, "a-alice").unwrap().0, id);

        let dup = session.add_client(id, &PanelClient::new("u2", "a-alice", true, 0)).await;
        assert!(matches!(dup, Err(PanelError::Rejected { .. })));

        assert_eq!(session.delete_client(id, "a-alice").await.unwrap(), Removal::Removed);
        assert_eq!(session.delete_client(id, "a-alice").await.unwrap(), Removal::Absent);
        assert_eq!(panel.client_count(URL), 0);
        assert_eq!(panel.login_count(URL), 1);
    }

    #[tokio::test]
    async fn test_unreachable_and_bad_password() {
        let (panel, endpoint, _) = fleet();
        panel.set_reachable(URL, false);
        assert!(matches!(
            panel.connect(&endpoint).await,
            Err(PanelError::Unreachable { .. })
        ));

        panel.set_reachable(URL, true);
        let wrong = NodeEndpoint::new("a", URL, "admin", "nope");
        assert!(matches!(
            panel.connect(&wrong).await,
            Err(PanelError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_and_peak_in_flight() {
        let (panel, endpoint, _) = fleet();
        panel.set_latency(URL, Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(panel.connect(&endpoint), panel.connect(&endpoint));
        assert!(a.is_ok() && b.is_ok());
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(panel.peak_in_flight(), 2);
        assert_eq!(panel.login_count(URL), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_is_journaled() {
        let (panel, endpoint, id) = fleet();
        let session = panel.connect(&endpoint).await.unwrap();
        panel.fail_deletes(URL, true);

        let err = session.delete_client(id, "a-alice").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(panel.calls(URL), vec![format!("delete:{id}:a-alice")]);
    }

    #[tokio::test]
    async fn test_stats_follow_entries() {
        let (panel, endpoint, id) = fleet();
        let session = panel.connect(&endpoint).await.unwrap();
        session.add_client(id, &PanelClient::new("u1", "a-bob", true, 0)).await.unwrap();

        panel.set_last_online(URL, "a-bob", 1_234);
        panel.set_traffic(URL, "a-bob", 10, 20);

        let inbounds = session.list_inbounds().await.unwrap();
        let stat = &inbounds[0].stats()[0];
        assert_eq!((stat.last_online, stat.up, stat.down), (1_234, 10, 20));
    }

    #[tokio::test]
    async fn test_update_keeps_stats() {
        let (panel, endpoint, id) = fleet();
        let session = panel.connect(&endpoint).await.unwrap();
        session.add_client(id, &PanelClient::new("u1", "a-bob", true, 0)).await.unwrap();

        let mut inbound = session.get_inbound(id).await.unwrap();
        let mut settings = inbound.parse_settings().unwrap();
        settings.clients[0].limit_ip = 3;
        inbound.set_settings(&settings).unwrap();
        inbound.client_stats = None;
        session.update_inbound(&inbound).await.unwrap();

        assert_eq!(panel.clients(URL, id)[0].limit_ip, 3);
        assert_eq!(session.list_inbounds().await.unwrap()[0].stats().len(), 1);
        assert_eq!(panel.calls(URL).last().unwrap(), &format!("update:{id}"));
    }
}
