// ============================================
// File: crates/keyfleet-server/src/lib.rs
// ============================================
//! # Keyfleet Engine Library
//!
//! ## Creation Reason
//! Keeps proxy credentials consistent across a fleet of independently
//! administered panel nodes, from one durable ledger.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Engine configuration
//! - [`store`]: Durable registry, directory and credential ledger
//! - [`services`]: Reconciliation, fleet operations, stats cache
//! - [`error`]: Engine error types
//!
//! ## Architecture Overview
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       keyfleetd CLI                        │
//! └─────────────────────────────┬──────────────────────────────┘
//!                               ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                          Fleet                             │
//! │  ┌──────────────┐    ┌──────────────┐   ┌──────────────┐   │
//! │  │  Reconciler  │───►│  StatsCache  │   │    Config    │   │
//! │  └──────┬───────┘    └──────┬───────┘   └──────────────┘   │
//! ├─────────┼───────────────────┼──────────────────────────────┤
//! │         ▼                   ▼                              │
//! │  ┌──────────────┐    ┌──────────────────────────────────┐  │
//! │  │ Store (JSON) │    │  PanelConnector (HTTP / mock)    │  │
//! │  └──────────────┘    └──────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The ledger is the source of truth; nodes are converged towards it
//! - Configuration changes require restart (no hot-reload)
//! - The state file holds node passwords; it is written with mode 0600
//!
//! ## Last Modified
//! v0.1.0 - Initial engine library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod services;
pub mod store;

// Re-export primary types
pub use config::FleetConfig;
pub use error::{FleetError, ReconcileError, Result, StoreError};
pub use services::{Fleet, NodeOutcome, NodeSnapshot, OutcomeStatus};
pub use store::Store;
