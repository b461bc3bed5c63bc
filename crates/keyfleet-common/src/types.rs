// ============================================
// File: crates/keyfleet-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers used throughout keyfleet so that a node id
//! can never be passed where a client id is expected.
//!
//! ## Main Functionality
//! - `NodeId`, `ClientId`, `CredentialId`: store row identifiers
//! - `Identifier`: the UUID a client presents to every node
//!
//! ## ⚠️ Important Note for Next Developer
//! - One `Identifier` is shared by all auto-issued credentials of a client;
//!   it is what keeps connection material portable across nodes
//! - Row ids are allocated by the store and never reused
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CommonError;

// ============================================
// Row identifiers
// ============================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw row id.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw row id.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = CommonError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|e| CommonError::invalid_input(stringify!($name), e.to_string()))
            }
        }
    };
}

row_id!(
    /// Identifier of a node in the registry.
    NodeId
);

row_id!(
    /// Identifier of a client in the directory.
    ClientId
);

row_id!(
    /// Identifier of a credential row in the ledger.
    CredentialId
);

// ============================================
// Identifier
// ============================================

/// The UUID a client is provisioned under on every node.
///
/// # Example
/// ```
/// use keyfleet_common::types::Identifier;
///
/// let id = Identifier::generate();
/// let parsed: Identifier = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(Uuid);

impl Identifier {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Panels expect the lowercase hyphenated form.
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identifier {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CommonError::invalid_input("identifier", e.to_string()))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_parse_and_display() {
        let id: NodeId = " 42 ".parse().unwrap();
        assert_eq!(id, NodeId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<ClientId>().is_err());
    }

    #[test]
    fn test_row_id_serializes_as_integer() {
        let json = serde_json::to_string(&CredentialId::new(9)).unwrap();
        assert_eq!(json, "9");
    }

    #[test]
    fn test_identifier_unique() {
        assert_ne!(Identifier::generate(), Identifier::generate());
    }

    #[test]
    fn test_identifier_lowercase_hyphenated() {
        let id: Identifier = "6F9619FF-8B86-D011-B42D-00C04FC964FF".parse().unwrap();
        assert_eq!(id.to_string(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }

    #[test]
    fn test_identifier_rejects_garbage() {
        let err = "not-a-uuid".parse::<Identifier>().unwrap_err();
        assert!(matches!(err, CommonError::InvalidInput { .. }));
    }
}
