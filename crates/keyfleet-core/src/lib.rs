// ============================================
// File: crates/keyfleet-core/src/lib.rs
// ============================================
//! # Keyfleet Core - Connection Material Library
//!
//! ## Creation Reason
//! Provides the pure, network-free pieces of credential handling: how a
//! connection URL is synthesized from a node domain and an identifier, how
//! transport profiles differ, and how a client's URLs are bundled into a
//! subscription document.
//!
//! ## Main Functionality
//!
//! ### Profile Module ([`profile`])
//! - `TransportProfile`: streaming-multiplexed (gRPC) and request-based (XHTTP)
//! - Per-profile query parameters, label suffixes and panel sub-labels
//!
//! ### Link Module ([`link`])
//! - `build_url`: deterministic `vless://` URL synthesis
//! - `validate_manual_link`: acceptance check for operator-supplied URLs
//!
//! ### Subscription Module ([`subscription`])
//! - Base64 bundle encoding/decoding of a client's URLs
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                keyfleet-server                      │
//! │         ┌───────────┼────────────┐                  │
//! │         ▼           ▼            ▼                  │
//! │   keyfleet-core  keyfleet-panel  keyfleet-common    │
//! │   You are here                                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Everything here must stay pure and deterministic; the ledger compares
//!   stored URLs with freshly built ones
//! - Changing a profile's parameters changes every URL already handed out
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod link;
pub mod profile;
pub mod subscription;

// Re-export commonly used items
pub use error::{CoreError, Result};
pub use link::{build_url, credential_label, validate_manual_link, DEFAULT_PORT};
pub use profile::TransportProfile;
pub use subscription::{decode_bundle, encode_bundle};
