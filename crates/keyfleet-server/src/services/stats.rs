// ============================================
// File: crates/keyfleet-server/src/services/stats.rs
// ============================================
//! # Fleet Stats Cache
//!
//! ## Creation Reason
//! Dashboards read per-node health far more often than it changes. This
//! cache bounds how often each node is queried.
//!
//! ## Main Functionality
//! - `NodeSnapshot`: Observed state of one node
//! - `StatsCache`: Per-node snapshot with a freshness window
//! - Offline snapshots are cached too, so a dead node isn't hammered
//!
//! ## Read Path
//! ```text
//! get(node)
//!   ├─ entry age <= freshness ──► cached snapshot
//!   └─ otherwise ──► login, list inbounds
//!                      ├─ ok   ──► counters snapshot ─┐
//!                      └─ fail ──► offline snapshot ──┴─► store with now
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Ages use `tokio::time::Instant` so tests can run on a paused clock
//! - Snapshots are immutable `Arc`s; entries are replaced, never edited
//! - Never hold a map guard across the live query
//!
//! ## Last Modified
//! v0.1.0 - Initial stats cache

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use keyfleet_common::time::{is_recently_seen, now_utc, unix_timestamp_millis};
use keyfleet_common::NodeId;
use keyfleet_panel::{Inbound, PanelConnector, PanelError};

use crate::config::{InboundsConfig, StatsConfig};
use crate::store::Node;

// ============================================
// NodeSnapshot
// ============================================

/// Observed state of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    /// Whether the node answered.
    pub online: bool,
    /// Uploaded bytes summed over all inbounds.
    pub up: u64,
    /// Downloaded bytes summed over all inbounds.
    pub down: u64,
    /// Client entries on the primary inbound.
    pub total_clients: usize,
    /// Enabled client entries on the primary inbound.
    pub enabled_clients: usize,
    /// Clients on the primary inbound seen within the active window.
    pub active_clients: usize,
    /// When the node was queried.
    pub checked_at: DateTime<Utc>,
}

impl NodeSnapshot {
    /// All-zero snapshot for a node that couldn't be queried.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            online: false,
            up: 0,
            down: 0,
            total_clients: 0,
            enabled_clients: 0,
            active_clients: 0,
            checked_at: now_utc(),
        }
    }

    fn from_inbounds(inbounds: &[Inbound], primary: Option<&Inbound>, active_window: Duration) -> Self {
        let now_ms = unix_timestamp_millis();
        let (total, enabled, active) = primary.map_or((0, 0, 0), |inbound| {
            let clients = inbound.parse_settings().map(|s| s.clients).unwrap_or_default();
            let active = inbound
                .stats()
                .iter()
                .filter(|s| is_recently_seen(s.last_online, now_ms, active_window))
                .count();
            (clients.len(), clients.iter().filter(|c| c.enable).count(), active)
        });

        Self {
            online: true,
            up: inbounds.iter().map(|i| i.up).sum(),
            down: inbounds.iter().map(|i| i.down).sum(),
            total_clients: total,
            enabled_clients: enabled,
            active_clients: active,
            checked_at: now_utc(),
        }
    }
}

// ============================================
// StatsCache
// ============================================

#[derive(Debug)]
struct CachedSnapshot {
    snapshot: Arc<NodeSnapshot>,
    captured_at: Instant,
}

/// Time-bounded cache of node snapshots.
pub struct StatsCache {
    entries: DashMap<NodeId, CachedSnapshot>,
    connector: Arc<dyn PanelConnector>,
    inbounds: InboundsConfig,
    freshness: Duration,
    active_window: Duration,
}

impl StatsCache {
    /// Creates an empty cache.
    pub fn new(connector: Arc<dyn PanelConnector>, inbounds: InboundsConfig, stats: &StatsConfig) -> Self {
        Self {
            entries: DashMap::new(),
            connector,
            inbounds,
            freshness: stats.freshness(),
            active_window: stats.active_window(),
        }
    }

    /// Returns the node's snapshot, querying it if the cached one is stale.
    pub async fn get(&self, node: &Node) -> Arc<NodeSnapshot> {
        let cached = self.entries.get(&node.id).and_then(|entry| {
            (entry.captured_at.elapsed() <= self.freshness).then(|| Arc::clone(&entry.snapshot))
        });
        if let Some(snapshot) = cached {
            debug!(node = %node.name, "Stats served from cache");
            return snapshot;
        }

        let snapshot = Arc::new(match self.query(node).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(node = %node.name, error = %e, "Node stats unavailable, caching offline snapshot");
                NodeSnapshot::offline()
            }
        });

        self.entries.insert(
            node.id,
            CachedSnapshot {
                snapshot: Arc::clone(&snapshot),
                captured_at: Instant::now(),
            },
        );
        snapshot
    }

    /// Drops the node's entry so the next read is live.
    pub fn invalidate(&self, node_id: NodeId) {
        if self.entries.remove(&node_id).is_some() {
            debug!(node_id = %node_id, "Stats cache entry invalidated");
        }
    }

    /// Returns `true` if an entry (fresh or not) exists for the node.
    #[must_use]
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.entries.contains_key(&node_id)
    }

    async fn query(&self, node: &Node) -> Result<NodeSnapshot, PanelError> {
        let session = self.connector.connect(&node.endpoint()).await?;
        let inbounds = session.list_inbounds().await?;
        let primary = self.inbounds.find_primary(&inbounds);
        Ok(NodeSnapshot::from_inbounds(&inbounds, primary, self.active_window))
    }
}

impl std::fmt::Debug for StatsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsCache")
            .field("entries", &self.entries.len())
            .field("freshness", &self.freshness)
            .field("active_window", &self.active_window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyfleet_panel::{MockPanel, PanelClient};

    use crate::store::{NewNode, Store};

    const URL: &str = "https://a.internal:2053";

    fn setup() -> (MockPanel, StatsCache, Node) {
        let panel = MockPanel::new();
        panel.add_node(URL, "admin", "pw");
        let primary = panel.add_inbound(URL, "vless", "vless-grpc");
        panel.add_inbound(URL, "vless", "vless-xhttp");
        panel.insert_client(URL, primary, PanelClient::new("u1", "alice", true, 0));
        panel.insert_client(URL, primary, PanelClient::new("u2", "bob", false, 0));

        let store = Store::in_memory();
        let node = store
            .insert_node(NewNode {
                name: "A".to_string(),
                base_url: URL.to_string(),
                domain: "a.example.com".to_string(),
                username: "admin".to_string(),
                password: "pw".to_string(),
            })
            .unwrap();

        let cache = StatsCache::new(
            Arc::new(panel.clone()),
            InboundsConfig::default(),
            &StatsConfig::default(),
        );
        (panel, cache, node)
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_and_traffic() {
        let (panel, cache, node) = setup();
        panel.set_last_online(URL, "alice", unix_timestamp_millis() - 10_000);
        panel.set_last_online(URL, "bob", unix_timestamp_millis() - 600_000);
        panel.set_inbound_traffic(URL, 1, 5, 7);
        panel.set_inbound_traffic(URL, 2, 100, 200);

        let snapshot = cache.get(&node).await;
        assert!(snapshot.online);
        assert_eq!(snapshot.total_clients, 2);
        assert_eq!(snapshot.enabled_clients, 1);
        assert_eq!(snapshot.active_clients, 1);
        assert_eq!((snapshot.up, snapshot.down), (105, 207));
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_window() {
        let (panel, cache, node) = setup();

        cache.get(&node).await;
        assert_eq!(panel.login_count(URL), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.get(&node).await;
        assert_eq!(panel.login_count(URL), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get(&node).await;
        assert_eq!(panel.login_count(URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_snapshot_is_cached() {
        let (panel, cache, node) = setup();
        panel.set_reachable(URL, false);

        let snapshot = cache.get(&node).await;
        assert!(!snapshot.online);
        assert_eq!(snapshot.total_clients, 0);
        assert!(cache.contains(node.id));

        // Back online, but the offline snapshot is still fresh.
        panel.set_reachable(URL, true);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!cache.get(&node).await.online);
        assert_eq!(panel.login_count(URL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_requery() {
        let (panel, cache, node) = setup();
        cache.get(&node).await;
        cache.invalidate(node.id);
        assert!(!cache.contains(node.id));

        cache.get(&node).await;
        assert_eq!(panel.login_count(URL), 2);
    }
}
