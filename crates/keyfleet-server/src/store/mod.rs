// ============================================
// File: crates/keyfleet-server/src/store/mod.rs
// ============================================
//! # Durable Store
//!
//! ## Creation Reason
//! Holds the three tables the engine works against (node registry, client
//! directory, credential ledger) and persists them as one JSON document.
//!
//! ## Main Functionality
//! - [`registry`]: Node descriptors
//! - [`directory`]: Clients
//! - [`ledger`]: Issued credentials
//! - `Store`: Lock, persistence, referential cascade
//!
//! ## Write Path
//! ```text
//! write(f)
//!   ├─► take write lock
//!   ├─► clone tables, apply f to the clone
//!   ├─► persist clone (temp file + rename)
//!   └─► swap clone in, release lock
//! ```
//! A failed mutation or a failed write leaves the in-memory state untouched.
//!
//! ## ⚠️ Important Note for Next Developer
//! - All ledger upserts happen under the write lock; never read-modify-write
//!   from outside `write`
//! - Never hold the lock across an `.await`
//! - Built for one admin process per state file. Each write clones the
//!   tables and does a blocking file write under the lock, so fan-out
//!   tasks serialize on it. Don't put it behind a multi-user API
//! - The state file contains node passwords; it is written with mode 0600
//!
//! ## Last Modified
//! v0.1.0 - Initial store

pub mod directory;
pub mod ledger;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keyfleet_common::{ClientId, CredentialId, NodeId};

use crate::error::StoreError;

pub use directory::Client;
pub use ledger::{Credential, CredentialOrigin, Managed};
pub use registry::{NewNode, Node, NodePatch};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Current state document version.
const STATE_VERSION: u32 = 1;

// ============================================
// Tables
// ============================================

/// In-memory form of the state document.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) clients: BTreeMap<ClientId, Client>,
    pub(crate) credentials: BTreeMap<CredentialId, Credential>,
    next_node: u64,
    next_client: u64,
    next_credential: u64,
}

impl Tables {
    pub(crate) fn allocate_node_id(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId::new(self.next_node)
    }

    pub(crate) fn allocate_client_id(&mut self) -> ClientId {
        self.next_client += 1;
        ClientId::new(self.next_client)
    }

    pub(crate) fn allocate_credential_id(&mut self) -> CredentialId {
        self.next_credential += 1;
        CredentialId::new(self.next_credential)
    }

    fn from_document(doc: StateDocument) -> StoreResult<Self> {
        if doc.version != STATE_VERSION {
            return Err(StoreError::Inconsistent(format!(
                "unsupported state version {}",
                doc.version
            )));
        }

        let tables = Self {
            nodes: doc.nodes.into_iter().map(|n| (n.id, n)).collect(),
            clients: doc.clients.into_iter().map(|c| (c.id, c)).collect(),
            credentials: doc.credentials.into_iter().map(|c| (c.id, c)).collect(),
            next_node: doc.next_node_id,
            next_client: doc.next_client_id,
            next_credential: doc.next_credential_id,
        };
        tables.check_references()?;
        Ok(tables)
    }

    fn to_document(&self) -> StateDocument {
        StateDocument {
            version: STATE_VERSION,
            next_node_id: self.next_node,
            next_client_id: self.next_client,
            next_credential_id: self.next_credential,
            nodes: self.nodes.values().cloned().collect(),
            clients: self.clients.values().cloned().collect(),
            credentials: self.credentials.values().cloned().collect(),
        }
    }

    fn check_references(&self) -> StoreResult<()> {
        for credential in self.credentials.values() {
            if !self.clients.contains_key(&credential.client_id) {
                return Err(StoreError::Inconsistent(format!(
                    "credential {} references missing client {}",
                    credential.id, credential.client_id
                )));
            }
            if let Some(node_id) = credential.node_id() {
                if !self.nodes.contains_key(&node_id) {
                    return Err(StoreError::Inconsistent(format!(
                        "credential {} references missing node {node_id}",
                        credential.id
                    )));
                }
            }
        }

        let max_node = self.nodes.keys().last().map_or(0, |id| id.get());
        let max_client = self.clients.keys().last().map_or(0, |id| id.get());
        let max_credential = self.credentials.keys().last().map_or(0, |id| id.get());
        if self.next_node < max_node
            || self.next_client < max_client
            || self.next_credential < max_credential
        {
            return Err(StoreError::Inconsistent(
                "id counters are behind existing rows".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serialized form of the state.
#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    #[serde(default)]
    next_node_id: u64,
    #[serde(default)]
    next_client_id: u64,
    #[serde(default)]
    next_credential_id: u64,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    clients: Vec<Client>,
    #[serde(default)]
    credentials: Vec<Credential>,
}

// ============================================
// Store
// ============================================

/// Registry, directory and ledger behind one lock.
pub struct Store {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl Store {
    /// Creates a store that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
        }
    }

    /// Opens the state file at `path`, starting empty if it doesn't exist.
    ///
    /// # Errors
    /// Returns `Io`, `Encoding` or `Inconsistent` if an existing file can't
    /// be used.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();

        let tables = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path_str, e))?;
            let doc: StateDocument = serde_json::from_str(&content)
                .map_err(|e| StoreError::Encoding(e.to_string()))?;
            let tables = Tables::from_document(doc)?;
            info!(
                path = %path_str,
                nodes = tables.nodes.len(),
                clients = tables.clients.len(),
                credentials = tables.credentials.len(),
                "State loaded"
            );
            tables
        } else {
            info!(path = %path_str, "No state file yet, starting empty");
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    /// Runs `f` against a consistent view of the tables.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.read())
    }

    /// Applies `f` and persists the result atomically.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.tables.write();
        let mut next = guard.clone();
        let value = f(&mut next)?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *guard = next;
        Ok(value)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("nodes", &tables.nodes.len())
            .field("clients", &tables.clients.len())
            .field("credentials", &tables.credentials.len())
            .finish()
    }
}

/// Writes the tables to `path` via a temp file and rename.
fn persist(path: &Path, tables: &Tables) -> StoreResult<()> {
    let path_str = path.display().to_string();
    let content = serde_json::to_string_pretty(&tables.to_document())
        .map_err(|e| StoreError::Encoding(e.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(&path_str, e))?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content).map_err(|e| StoreError::io(&path_str, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| StoreError::io(&path_str, e))?;
    }

    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(&path_str, e))?;
    debug!(path = %path_str, "State persisted");
    Ok(())
}
