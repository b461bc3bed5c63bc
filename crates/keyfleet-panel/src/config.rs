// ============================================
// File: crates/keyfleet-panel/src/config.rs
// ============================================
//! # Panel Client Configuration

use serde::{Deserialize, Serialize};

/// HTTP settings for control-API sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelClientConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Path prefix of the JSON API, relative to the node base URL.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Accept self-signed certificates (panels are usually reached over a
    /// private overlay network with their own certificates).
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_api_prefix() -> String {
    "/panel/api".to_string()
}

fn default_accept_invalid_certs() -> bool {
    true
}

impl Default for PanelClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            api_prefix: default_api_prefix(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

impl PanelClientConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }
        if !self.api_prefix.is_empty() && !self.api_prefix.starts_with('/') {
            return Err("api_prefix must start with '/'".to_string());
        }
        Ok(())
    }

    /// Returns the API prefix without a trailing slash.
    #[must_use]
    pub fn normalized_prefix(&self) -> &str {
        self.api_prefix.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(PanelClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = PanelClientConfig {
            request_timeout_secs: 0,
            ..PanelClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prefix_normalization() {
        let config = PanelClientConfig {
            api_prefix: "/panel/api/".to_string(),
            ..PanelClientConfig::default()
        };
        assert_eq!(config.normalized_prefix(), "/panel/api");
    }
}
