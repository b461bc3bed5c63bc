// ============================================
// File: crates/keyfleet-core/src/profile.rs
// ============================================
//! # Transport Profiles
//!
//! ## Creation Reason
//! A node exposes up to two inbounds the engine can provision: the primary
//! streaming-multiplexed one and an optional request-based alternative.
//! Each has its own fixed URL parameter set and its own label suffix.
//!
//! ## Profile Table
//! | Profile | `type`  | extra parameters          | label suffix |
//! |---------|---------|---------------------------|--------------|
//! | Grpc    | `grpc`  | `serviceName=sync`        | (none)       |
//! | Xhttp   | `xhttp` | `path=/sync`, `mode=auto` | `-xhttp`     |
//!
//! ## Last Modified
//! v0.1.0 - Initial profile definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Parameters shared by every profile.
const COMMON_PARAMS: [(&str, &str); 2] = [("encryption", "none"), ("security", "tls")];

const GRPC_PARAMS: [(&str, &str); 2] = [("type", "grpc"), ("serviceName", "sync")];

const XHTTP_PARAMS: [(&str, &str); 3] = [("type", "xhttp"), ("path", "/sync"), ("mode", "auto")];

/// Transport profile of an inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProfile {
    /// Streaming-multiplexed transport (gRPC). The primary profile.
    Grpc,
    /// Request-based transport (XHTTP). The optional secondary profile.
    Xhttp,
}

impl TransportProfile {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::Xhttp => "xhttp",
        }
    }

    /// Suffix appended to URL labels and panel sub-labels.
    #[must_use]
    pub const fn label_suffix(self) -> &'static str {
        match self {
            Self::Grpc => "",
            Self::Xhttp => "-xhttp",
        }
    }

    /// Full ordered query parameter list (unencoded).
    #[must_use]
    pub fn query_params(self) -> Vec<(&'static str, &'static str)> {
        let specific: &[(&str, &str)] = match self {
            Self::Grpc => &GRPC_PARAMS,
            Self::Xhttp => &XHTTP_PARAMS,
        };
        COMMON_PARAMS.iter().chain(specific).copied().collect()
    }

    /// Label under which a client is registered on an inbound of this profile.
    ///
    /// The primary profile uses the client label verbatim; the secondary one
    /// appends its suffix so both entries can coexist on the same node.
    #[must_use]
    pub fn remote_label(self, client_label: &str) -> String {
        format!("{client_label}{}", self.label_suffix())
    }
}

impl fmt::Display for TransportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportProfile {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grpc" | "stream" => Ok(Self::Grpc),
            "xhttp" | "request" => Ok(Self::Xhttp),
            other => Err(CoreError::UnknownProfile(other.to_string())),
        }
    }
}
