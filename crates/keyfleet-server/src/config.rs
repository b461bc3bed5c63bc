// ============================================
// File: crates/keyfleet-server/src/config.rs
// ============================================
//! # Fleet Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the keyfleet engine and CLI,
//! loaded from a TOML file.
//!
//! ## Main Functionality
//! - `FleetConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Inbound selection rules (which remote inbound is primary/secondary)
//!
//! ## Configuration Sections
//! - `storage`: State file location
//! - `panel`: HTTP settings for node control APIs
//! - `inbounds`: How primary and secondary inbounds are recognised
//! - `reconcile`: Fan-out width and identifier policy
//! - `stats`: Cache freshness and liveness windows
//! - `subscription`: Public base URL of the subscription endpoint
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [storage]
//! state_file = "/var/lib/keyfleet/state.json"
//!
//! [panel]
//! request_timeout_secs = 10
//! api_prefix = "/panel/api"
//!
//! [inbounds]
//! protocol = "vless"
//! secondary_remark = "vless-xhttp"
//!
//! [reconcile]
//! max_concurrency = 8
//! rotate_identifier = false
//!
//! [stats]
//! freshness_secs = 30
//! active_window_secs = 120
//!
//! [subscription]
//! base_url = "https://sub.example.com"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require restart
//! - Without `primary_remark` the first inbound of the configured protocol
//!   that is not the secondary one is used
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use keyfleet_core::TransportProfile;
use keyfleet_panel::{Inbound, PanelClientConfig};

use crate::error::{FleetError, Result};

// ============================================
// FleetConfig
// ============================================

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Durable state location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Panel HTTP client settings.
    #[serde(default)]
    pub panel: PanelClientConfig,

    /// Inbound selection.
    #[serde(default)]
    pub inbounds: InboundsConfig,

    /// Reconciliation settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Stats cache settings.
    #[serde(default)]
    pub stats: StatsConfig,

    /// Subscription link settings.
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FleetConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FleetError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| FleetError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the string cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| FleetError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.panel
            .validate()
            .map_err(|e| FleetError::config_invalid("panel", e))?;
        self.inbounds.validate()?;
        self.reconcile.validate()?;
        self.stats.validate()?;
        self.subscription.validate()?;
        Ok(())
    }
}

// ============================================
// StorageConfig
// ============================================

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON state document.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/var/lib/keyfleet/state.json")
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.state_file.as_os_str().is_empty() {
            return Err(FleetError::config_invalid(
                "storage.state_file",
                "cannot be empty",
            ));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

// ============================================
// InboundsConfig
// ============================================

/// Which remote inbounds the engine targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundsConfig {
    /// Protocol tag both inbounds must carry.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Remark of the primary inbound; unset means "first match".
    #[serde(default)]
    pub primary_remark: Option<String>,

    /// Remark of the secondary inbound; an empty string disables the
    /// secondary path.
    #[serde(default = "default_secondary_remark")]
    pub secondary_remark: Option<String>,

    /// Transport profile of the primary inbound.
    #[serde(default = "default_primary_profile")]
    pub primary_profile: TransportProfile,

    /// Transport profile of the secondary inbound.
    #[serde(default = "default_secondary_profile")]
    pub secondary_profile: TransportProfile,
}

fn default_protocol() -> String {
    "vless".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_secondary_remark() -> Option<String> {
    Some("vless-xhttp".to_string())
}

fn default_primary_profile() -> TransportProfile {
    TransportProfile::Grpc
}

fn default_secondary_profile() -> TransportProfile {
    TransportProfile::Xhttp
}

impl InboundsConfig {
    fn validate(&self) -> Result<()> {
        if self.protocol.is_empty() {
            return Err(FleetError::config_invalid(
                "inbounds.protocol",
                "cannot be empty",
            ));
        }
        if self.primary_profile == self.secondary_profile {
            return Err(FleetError::config_invalid(
                "inbounds.secondary_profile",
                "must differ from primary_profile",
            ));
        }
        if self.primary_remark.is_some() && self.primary_remark == self.secondary_remark {
            return Err(FleetError::config_invalid(
                "inbounds.secondary_remark",
                "must differ from primary_remark",
            ));
        }
        Ok(())
    }

    /// Locates the primary inbound in a node's inbound list.
    #[must_use]
    pub fn find_primary<'a>(&self, inbounds: &'a [Inbound]) -> Option<&'a Inbound> {
        inbounds.iter().find(|i| {
            i.protocol == self.protocol
                && match &self.primary_remark {
                    Some(remark) => &i.remark == remark,
                    None => self.secondary_remark.as_ref() != Some(&i.remark),
                }
        })
    }

    /// Locates the secondary inbound, if one is configured and present.
    #[must_use]
    pub fn find_secondary<'a>(&self, inbounds: &'a [Inbound]) -> Option<&'a Inbound> {
        let remark = self.secondary_remark.as_deref().filter(|r| !r.is_empty())?;
        inbounds
            .iter()
            .find(|i| i.protocol == self.protocol && i.remark == remark)
    }
}

impl Default for InboundsConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            primary_remark: None,
            secondary_remark: default_secondary_remark(),
            primary_profile: default_primary_profile(),
            secondary_profile: default_secondary_profile(),
        }
    }
}

// ============================================
// ReconcileConfig
// ============================================

/// Reconciliation configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Maximum nodes worked on at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Mint a fresh identifier on every apply instead of reusing one.
    #[serde(default)]
    pub rotate_identifier: bool,
}

fn default_max_concurrency() -> usize {
    8
}

impl ReconcileConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(FleetError::config_invalid(
                "reconcile.max_concurrency",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            rotate_identifier: false,
        }
    }
}

// ============================================
// StatsConfig
// ============================================

/// Stats cache configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// How long a snapshot is served from cache, in seconds.
    #[serde(default = "default_freshness")]
    pub freshness_secs: u64,

    /// A client seen within this many seconds counts as active.
    #[serde(default = "default_active_window")]
    pub active_window_secs: u64,
}

fn default_freshness() -> u64 {
    30
}

fn default_active_window() -> u64 {
    120
}

impl StatsConfig {
    fn validate(&self) -> Result<()> {
        if self.freshness_secs == 0 {
            return Err(FleetError::config_invalid(
                "stats.freshness_secs",
                "must be greater than 0",
            ));
        }
        if self.active_window_secs == 0 {
            return Err(FleetError::config_invalid(
                "stats.active_window_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Freshness window as a duration.
    #[must_use]
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    /// Liveness window as a duration.
    #[must_use]
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window_secs)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness(),
            active_window_secs: default_active_window(),
        }
    }
}

// ============================================
// SubscriptionConfig
// ============================================

/// Subscription configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Public base URL the subscription endpoint is served from.
    #[serde(default = "default_subscription_url")]
    pub base_url: String,
}

fn default_subscription_url() -> String {
    "http://localhost:8001".to_string()
}

impl SubscriptionConfig {
    fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(FleetError::config_invalid(
                "subscription.base_url",
                "must be an http(s) URL",
            ));
        }
        Ok(())
    }

    /// Subscription link for a client label.
    #[must_use]
    pub fn link_for(&self, label: &str) -> String {
        format!(
            "{}/sub/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(label)
        )
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: default_subscription_url(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================
