//! ============================================
//! File: crates/keyfleet-panel/src/models.rs
//! ============================================
//! Purpose: Wire models for the panel control API
//!
//! Main Data Structures:
//!   - ApiResponse: `{success, msg, obj}` envelope every endpoint returns
//!   - Inbound: one listener/profile on a node
//!   - InboundSettings: the JSON document stored as a *string* in `settings`
//!   - PanelClient: one client entry inside `settings.clients`
//!   - ClientStat: per-client traffic and last-seen data
//!
//! ⚠️ Important Note for Next Developer:
//!   - `Inbound::settings` is a serialized JSON string, not an object.
//!     Always go through `Inbound::parse_settings` / `Inbound::set_settings`
//!   - Unknown fields are preserved through `extra` so that a
//!     get-modify-update cycle never drops panel configuration we don't model
//!   - `clientStats` may be `null` on older panels
//!
//! Last Modified: v0.1.0 - Initial models
//! ============================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PanelError, Result};

/// Envelope returned by every panel endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the panel accepted the call.
    pub success: bool,
    /// Human-readable message (often empty).
    #[serde(default)]
    pub msg: String,
    /// Payload.
    pub obj: Option<T>,
}

/// One inbound (listener/profile) on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    /// Panel-assigned id.
    pub id: u64,
    /// Protocol tag (`vless`, `vmess`, `trojan`, ...).
    #[serde(default)]
    pub protocol: String,
    /// Display label.
    #[serde(default)]
    pub remark: String,
    /// Serialized [`InboundSettings`].
    #[serde(default)]
    pub settings: String,
    /// Uploaded bytes.
    #[serde(default)]
    pub up: u64,
    /// Downloaded bytes.
    #[serde(default)]
    pub down: u64,
    /// Per-client statistics.
    #[serde(rename = "clientStats", default, skip_serializing)]
    pub client_stats: Option<Vec<ClientStat>>,
    /// Fields we round-trip without interpreting.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Inbound {
    /// Creates an inbound with empty settings.
    #[must_use]
    pub fn new(id: u64, protocol: impl Into<String>, remark: impl Into<String>) -> Self {
        Self {
            id,
            protocol: protocol.into(),
            remark: remark.into(),
            settings: String::new(),
            up: 0,
            down: 0,
            client_stats: None,
            extra: Map::new(),
        }
    }

    /// Parses the embedded settings document.
    ///
    /// An empty settings string is treated as an inbound without clients.
    ///
    /// # Errors
    /// Returns `PanelError::Decode` if the string is not valid settings JSON.
    pub fn parse_settings(&self) -> Result<InboundSettings> {
        if self.settings.trim().is_empty() {
            return Ok(InboundSettings::default());
        }
        serde_json::from_str(&self.settings).map_err(|e| PanelError::decode("inbound settings", e))
    }

    /// Replaces the embedded settings document.
    ///
    /// # Errors
    /// Returns `PanelError::Decode` if serialization fails.
    pub fn set_settings(&mut self, settings: &InboundSettings) -> Result<()> {
        self.settings =
            serde_json::to_string(settings).map_err(|e| PanelError::decode("inbound settings", e))?;
        Ok(())
    }

    /// Returns `true` if a client entry with `label` exists.
    ///
    /// Unparseable settings count as "no such client"; the caller's
    /// delete-then-add sequence tolerates both answers.
    #[must_use]
    pub fn has_client(&self, label: &str) -> bool {
        self.parse_settings()
            .map(|s| s.clients.iter().any(|c| c.email == label))
            .unwrap_or(false)
    }

    /// Returns client statistics, treating `null` as empty.
    #[must_use]
    pub fn stats(&self) -> &[ClientStat] {
        self.client_stats.as_deref().unwrap_or_default()
    }
}

/// The settings document embedded in an inbound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundSettings {
    /// Client entries.
    #[serde(default)]
    pub clients: Vec<PanelClient>,
    /// Other settings (`decryption`, `fallbacks`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One client entry inside an inbound's settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelClient {
    /// Credential identifier (UUID for vless).
    pub id: String,
    /// XTLS flow, empty for gRPC/XHTTP.
    #[serde(default)]
    pub flow: String,
    /// Client label; panels call it "email".
    pub email: String,
    /// Max simultaneous IPs, 0 = unlimited.
    #[serde(rename = "limitIp", default)]
    pub limit_ip: u32,
    /// Traffic quota in bytes, 0 = unlimited.
    #[serde(rename = "totalGB", default)]
    pub total_gb: u64,
    /// Expiry in ms since epoch, 0 = never.
    #[serde(rename = "expiryTime", default)]
    pub expiry_time: i64,
    /// Whether the entry is active.
    #[serde(default)]
    pub enable: bool,
    /// Subscription id used by the panel's own subscription feature.
    #[serde(rename = "subId", default)]
    pub sub_id: String,
    /// Fields we round-trip without interpreting (`tgId`, `reset`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PanelClient {
    /// Creates an entry with unlimited quota and no expiry.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, enable: bool, limit_ip: u32) -> Self {
        let email = email.into();
        let mut extra = Map::new();
        extra.insert("tgId".to_string(), Value::String(String::new()));
        Self {
            id: id.into(),
            flow: String::new(),
            sub_id: email.clone(),
            email,
            limit_ip,
            total_gb: 0,
            expiry_time: 0,
            enable,
            extra,
        }
    }
}

/// Per-client statistics reported by the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStat {
    /// Client label.
    pub email: String,
    /// Last time the client was seen, ms since epoch (0 = never).
    #[serde(rename = "lastOnline", default)]
    pub last_online: i64,
    /// Whether the panel considers the client enabled.
    #[serde(default)]
    pub enable: bool,
    /// Uploaded bytes.
    #[serde(default)]
    pub up: u64,
    /// Downloaded bytes.
    #[serde(default)]
    pub down: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_BODY: &str = r#"{
        "success": true,
        "msg": "",
        "obj": [{
            "id": 1,
            "protocol": "vless",
            "remark": "vless-grpc",
            "port": 443,
            "settings": "{\"clients\":[{\"id\":\"6f9619ff-8b86-d011-b42d-00c04fc964ff\",\"email\":\"alice\",\"enable\":true,\"limitIp\":2,\"tgId\":42}],\"decryption\":\"none\"}",
            "up": 100,
            "down": 200,
            "clientStats": [{"email": "alice", "lastOnline": 1700000000000, "enable": true, "up": 1, "down": 2}]
        }, {
            "id": 2,
            "protocol": "trojan",
            "remark": "legacy",
            "settings": "",
            "clientStats": null
        }]
    }"#;

    #[test]
    fn test_parse_list_response() {
        let response: ApiResponse<Vec<Inbound>> = serde_json::from_str(LIST_BODY).unwrap();
        assert!(response.success);
        let inbounds = response.obj.unwrap();
        assert_eq!(inbounds.len(), 2);

        let grpc = &inbounds[0];
        assert_eq!(grpc.remark, "vless-grpc");
        assert_eq!(grpc.stats()[0].last_online, 1_700_000_000_000);
        assert!(grpc.has_client("alice"));
        assert!(!grpc.has_client("bob"));

        let settings = grpc.parse_settings().unwrap();
        assert_eq!(settings.clients[0].limit_ip, 2);
        assert_eq!(settings.extra["decryption"], "none");

        assert!(inbounds[1].stats().is_empty());
        assert!(inbounds[1].parse_settings().unwrap().clients.is_empty());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let response: ApiResponse<Vec<Inbound>> = serde_json::from_str(LIST_BODY).unwrap();
        let mut inbound = response.obj.unwrap().remove(0);

        let mut settings = inbound.parse_settings().unwrap();
        settings.clients[0].limit_ip = 5;
        inbound.set_settings(&settings).unwrap();

        let value = serde_json::to_value(&inbound).unwrap();
        assert_eq!(value["port"], 443);
        assert!(value.get("clientStats").is_none());

        let reparsed = inbound.parse_settings().unwrap();
        assert_eq!(reparsed.clients[0].limit_ip, 5);
        assert_eq!(reparsed.clients[0].extra["tgId"], 42);
    }

    #[test]
    fn test_new_client_defaults() {
        let client = PanelClient::new("id-1", "alice", false, 0);
        let value = serde_json::to_value(&client).unwrap();
        assert_eq!(value["email"], "alice");
        assert_eq!(value["subId"], "alice");
        assert_eq!(value["totalGB"], 0);
        assert_eq!(value["expiryTime"], 0);
        assert_eq!(value["enable"], false);
        assert_eq!(value["tgId"], "");
    }

    #[test]
    fn test_invalid_settings_is_decode_error() {
        let mut inbound = Inbound::new(1, "vless", "x");
        inbound.settings = "{not json".to_string();
        assert!(matches!(inbound.parse_settings(), Err(PanelError::Decode { .. })));
        assert!(!inbound.has_client("alice"));
    }
}
