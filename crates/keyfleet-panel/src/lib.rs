// ============================================
// File: crates/keyfleet-panel/src/lib.rs
// ============================================
//! # Keyfleet Panel - Node Control API Layer
//!
//! ## Creation Reason
//! Every edge node runs third-party proxy-panel software with a
//! session-authenticated HTTP control API. This crate hides that API behind
//! two small traits so the reconciliation engine can be driven against real
//! nodes or an in-memory fleet in tests.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `PanelConnector` / `PanelSession` abstractions
//! - [`http`]: reqwest implementation with cookie sessions
//! - [`models`]: Wire models (inbounds, client entries, client stats)
//! - [`config`]: HTTP client settings
//! - [`mock`]: In-memory panel fleet (feature `mock`)
//! - [`error`]: Panel-specific error types
//!
//! ## Session Flow
//! ```text
//! connect(endpoint)
//!   └─► POST /login (form: username, password) ──► session cookie
//!         ├─► GET  {prefix}/inbounds/list
//!         ├─► POST {prefix}/inbounds/addClient
//!         ├─► POST {prefix}/inbounds/{id}/delClientByEmail/{label}
//!         ├─► GET  {prefix}/inbounds/get/{id}
//!         └─► POST {prefix}/inbounds/update/{id}
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Sessions are short-lived: one per reconciliation step, never cached
//! - Always go through the traits; the engine must stay testable
//! - Mock implementation available with the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial panel client

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod traits;

// Mock implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export primary types
pub use config::PanelClientConfig;
pub use error::{PanelError, Result};
pub use http::HttpPanelConnector;
pub use models::{ClientStat, Inbound, InboundSettings, PanelClient};
pub use traits::{NodeEndpoint, PanelConnector, PanelSession, Removal};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockPanel;
