// ============================================
// File: crates/keyfleet-common/src/lib.rs
// ============================================
//! # Keyfleet Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Provides foundational types and utilities shared across all keyfleet
//! crates, so that node, client and credential identities look the same
//! in the store, the engine and the panel client.
//!
//! ## Main Functionality
//! - [`types`]: Row identifiers and the credential [`Identifier`]
//! - [`time`]: Wall-clock helpers and liveness checks
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              keyfleet-server                        │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │   keyfleet-core         keyfleet-panel              │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             keyfleet-common  ◄── You are here       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal
//! - Row ids serialize as plain integers; the state file depends on it
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use types::{ClientId, CredentialId, Identifier, NodeId};
