// ============================================
// File: crates/keyfleet-core/src/link.rs
// ============================================
//! # Connection URL Synthesis
//!
//! ## Creation Reason
//! Builds the connection string a client imports into its proxy app.
//! The URL carries the client's identifier, the node's public domain (never
//! the control address), a fixed port and the profile's parameter set.
//!
//! ## URL Layout
//! ```text
//! vless://<identifier>@<domain>:443?encryption=none&security=tls&type=grpc&serviceName=sync#<label>
//!         └────┬─────┘ └──┬───┘ └┬┘ └──────────────────── profile params ───────────────┘ └──┬──┘
//!          identifier   domain  port                                              label + suffix
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `build_url` must stay byte-for-byte deterministic
//! - The label fragment is percent-encoded; `@` in client labels becomes `%40`
//!
//! ## Last Modified
//! v0.1.0 - Initial URL synthesis

use std::fmt;

use crate::error::{CoreError, Result};
use crate::profile::TransportProfile;

/// Port every synthesized URL points at.
pub const DEFAULT_PORT: u16 = 443;

/// URL scheme of synthesized credentials.
pub const SCHEME: &str = "vless";

/// Schemes accepted for manually entered credentials.
pub const MANUAL_SCHEMES: [&str; 5] = ["vless", "vmess", "trojan", "ss", "hysteria2"];

/// Builds a connection URL.
///
/// # Arguments
/// * `domain` - Public domain of the node
/// * `identifier` - Credential identifier (normally a UUID)
/// * `label` - Human-readable label, conventionally `{node}-{client}`
/// * `profile` - Transport profile selecting parameters and label suffix
///
/// # Example
/// ```
/// use keyfleet_core::{build_url, TransportProfile};
///
/// let url = build_url("ex.com", "U1", "Node-A-user", TransportProfile::Grpc);
/// assert_eq!(
///     url,
///     "vless://U1@ex.com:443?encryption=none&security=tls&type=grpc&serviceName=sync#Node-A-user"
/// );
/// ```
#[must_use]
pub fn build_url(
    domain: &str,
    identifier: impl fmt::Display,
    label: &str,
    profile: TransportProfile,
) -> String {
    let query = profile
        .query_params()
        .into_iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let fragment = urlencoding::encode(&format!("{label}{}", profile.label_suffix())).into_owned();

    format!("{SCHEME}://{identifier}@{domain}:{DEFAULT_PORT}?{query}#{fragment}")
}

/// Conventional URL label for a managed credential.
#[must_use]
pub fn credential_label(node_name: &str, client_label: &str) -> String {
    format!("{node_name}-{client_label}")
}

/// Validates an operator-supplied connection link.
///
/// Returns the trimmed link on success.
///
/// # Errors
/// Returns `CoreError::InvalidLink` if the link is empty, has no scheme,
/// uses an unsupported scheme, or has nothing after the scheme.
pub fn validate_manual_link(link: &str) -> Result<&str> {
    let link = link.trim();
    if link.is_empty() {
        return Err(CoreError::invalid_link("link cannot be empty"));
    }

    let Some((scheme, rest)) = link.split_once("://") else {
        return Err(CoreError::invalid_link("missing scheme separator '://'"));
    };

    if !MANUAL_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        return Err(CoreError::invalid_link(format!(
            "unsupported scheme '{scheme}' (expected one of {})",
            MANUAL_SCHEMES.join(", ")
        )));
    }

    if rest.is_empty() {
        return Err(CoreError::invalid_link("nothing after scheme"));
    }

    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_is_deterministic() {
        let a = build_url("ex.com", "U1", "Node-A-user", TransportProfile::Grpc);
        let b = build_url("ex.com", "U1", "Node-A-user", TransportProfile::Grpc);
        assert_eq!(a, b);
    }

    #[test]
    fn test_transport_changes_only_params_and_suffix() {
        let grpc = build_url("ex.com", "U1", "Node-A-user", TransportProfile::Grpc);
        let xhttp = build_url("ex.com", "U1", "Node-A-user", TransportProfile::Xhttp);

        let prefix = "vless://U1@ex.com:443?encryption=none&security=tls&";
        assert!(grpc.starts_with(prefix));
        assert!(xhttp.starts_with(prefix));

        assert!(grpc.ends_with("type=grpc&serviceName=sync#Node-A-user"));
        assert!(xhttp.ends_with("type=xhttp&path=%2Fsync&mode=auto#Node-A-user-xhttp"));
    }

    #[test]
    fn test_label_is_percent_encoded() {
        let url = build_url("vienna.example.com", "U1", "Vienna-alice@mail.com", TransportProfile::Grpc);
        assert!(url.ends_with("#Vienna-alice%40mail.com"));
    }

    #[test]
    fn test_credential_label() {
        assert_eq!(credential_label("Vienna", "alice@x"), "Vienna-alice@x");
    }

    #[test]
    fn test_manual_link_accepts_known_schemes() {
        assert_eq!(validate_manual_link("  trojan://pw@host:443 ").unwrap(), "trojan://pw@host:443");
        assert!(validate_manual_link("VLESS://id@host:443").is_ok());
    }

    #[test]
    fn test_manual_link_rejections() {
        assert!(validate_manual_link("").is_err());
        assert!(validate_manual_link("host:443").is_err());
        assert!(validate_manual_link("http://host").is_err());
        assert!(validate_manual_link("vmess://").is_err());
    }
}
