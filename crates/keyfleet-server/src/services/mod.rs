// ============================================
// File: crates/keyfleet-server/src/services/mod.rs
// ============================================
//! # Fleet Services
//!
//! ## Creation Reason
//! Business logic of the engine, separated from storage and from the
//! panel transport.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`reconcile`]: Per-node sync, revoke, limit push and audit
//! - [`fleet`]: Fleet-wide operations and bounded fan-out
//! - [`stats`]: Per-node snapshot cache
//!
//! ## Service Architecture
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Fleet                              │
//! │   apply / revoke / backfill / lifecycle / subscription   │
//! └──────────────┬──────────────────────────┬────────────────┘
//!                │ per node                 │ reads
//!                ▼                          ▼
//!      ┌──────────────────┐       ┌──────────────────┐
//!      │    Reconciler    │──────►│    StatsCache    │
//!      │ sync / revoke    │ inval │ freshness window │
//!      └────────┬─────────┘       └────────┬─────────┘
//!               │                          │
//!               ▼                          ▼
//!        Store (ledger)         PanelConnector (nodes)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Services are shared through `Arc`; all methods take `&self`
//! - Remote failures never escape as errors past `Fleet`
//!
//! ## Last Modified
//! v0.1.0 - Initial services

pub mod fleet;
pub mod reconcile;
pub mod stats;

pub use fleet::{BackfillReport, ClientOutcome, Fleet, RemovalReport, Subscription};
pub use reconcile::{DriftReport, NodeOutcome, OutcomeStatus, Reconciler};
pub use stats::{NodeSnapshot, StatsCache};
