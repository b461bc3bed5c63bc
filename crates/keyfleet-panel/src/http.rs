// ============================================
// File: crates/keyfleet-panel/src/http.rs
// ============================================
//! # HTTP Panel Client
//!
//! ## Creation Reason
//! reqwest-based implementation of [`PanelConnector`] and [`PanelSession`]
//! for 3x-ui style control APIs.
//!
//! ## Main Functionality
//! - Form login that yields a cookie-backed session
//! - JSON calls for listing inbounds, adding and deleting client entries,
//!   and the get/update pair used for bulk edits
//!
//! ## ⚠️ Important Note for Next Developer
//! - Each `connect` builds a fresh `reqwest::Client` so cookies never leak
//!   between nodes
//! - Delete is best-effort: anything except a transport failure maps to a
//!   `Removal` value
//! - Never log the password or the session cookie
//!
//! ## Last Modified
//! v0.1.0 - Initial HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::PanelClientConfig;
use crate::error::{PanelError, Result};
use crate::models::{ApiResponse, Inbound, InboundSettings, PanelClient};
use crate::traits::{NodeEndpoint, PanelConnector, PanelSession, Removal};

// ============================================
// HttpPanelConnector
// ============================================

/// Opens cookie-backed sessions against real panels.
#[derive(Debug, Clone, Default)]
pub struct HttpPanelConnector {
    config: PanelClientConfig,
}

impl HttpPanelConnector {
    /// Creates a connector with the given HTTP settings.
    #[must_use]
    pub fn new(config: PanelClientConfig) -> Self {
        Self { config }
    }

    fn build_client(&self) -> Result<Client> {
        Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .danger_accept_invalid_certs(self.config.accept_invalid_certs)
            .build()
            .map_err(|e| PanelError::Setup {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl PanelConnector for HttpPanelConnector {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Box<dyn PanelSession>> {
        let http = self.build_client()?;
        let url = format!("{}/login", endpoint.base_url);

        debug!(node = %endpoint.name, "Logging in to panel");

        let response = http
            .post(&url)
            .form(&[
                ("username", endpoint.username.as_str()),
                ("password", endpoint.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PanelError::unreachable(&endpoint.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PanelError::authentication_failed(
                &endpoint.name,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body: ApiResponse<Value> = response.json().await.map_err(|e| {
            PanelError::authentication_failed(&endpoint.name, format!("unreadable login response: {e}"))
        })?;
        if !body.success {
            return Err(PanelError::authentication_failed(&endpoint.name, body.msg));
        }

        Ok(Box::new(HttpPanelSession {
            http,
            node: endpoint.name.clone(),
            api_base: format!("{}{}", endpoint.base_url, self.config.normalized_prefix()),
        }))
    }
}

// ============================================
// HttpPanelSession
// ============================================

/// One logged-in session against a single node.
struct HttpPanelSession {
    http: Client,
    node: String,
    api_base: String,
}

impl HttpPanelSession {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: std::result::Result<Response, reqwest::Error>,
    ) -> Result<ApiResponse<T>> {
        let response = response.map_err(|e| PanelError::unreachable(&self.node, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PanelError::Status {
                operation,
                status: status.as_u16(),
            });
        }
        response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| PanelError::decode(operation, e))
    }

    fn accepted<T>(operation: &'static str, body: ApiResponse<T>) -> Result<ApiResponse<T>> {
        if body.success {
            Ok(body)
        } else {
            Err(PanelError::Rejected {
                operation,
                message: body.msg,
            })
        }
    }
}

#[async_trait]
impl PanelSession for HttpPanelSession {
    async fn list_inbounds(&self) -> Result<Vec<Inbound>> {
        const OP: &str = "list inbounds";
        let response = self.http.get(self.url("/inbounds/list")).send().await;
        let body = Self::accepted(OP, self.envelope::<Vec<Inbound>>(OP, response).await?)?;
        Ok(body.obj.unwrap_or_default())
    }

    async fn add_client(&self, inbound_id: u64, client: &PanelClient) -> Result<()> {
        const OP: &str = "add client";
        let settings = InboundSettings {
            clients: vec![client.clone()],
            extra: Map::new(),
        };
        let settings = serde_json::to_string(&settings).map_err(|e| PanelError::decode(OP, e))?;

        let response = self
            .http
            .post(self.url("/inbounds/addClient"))
            .json(&json!({ "id": inbound_id, "settings": settings }))
            .send()
            .await;
        Self::accepted(OP, self.envelope::<Value>(OP, response).await?)?;

        debug!(node = %self.node, inbound_id, label = %client.email, "Client entry added");
        Ok(())
    }

    async fn delete_client(&self, inbound_id: u64, label: &str) -> Result<Removal> {
        let path = format!(
            "/inbounds/{inbound_id}/delClientByEmail/{}",
            urlencoding::encode(label)
        );
        let response = self
            .http
            .post(self.url(&path))
            .send()
            .await
            .map_err(|e| PanelError::unreachable(&self.node, e))?;

        if !response.status().is_success() {
            debug!(
                node = %self.node,
                inbound_id,
                label,
                status = response.status().as_u16(),
                "Delete answered with non-success status, treating as absent"
            );
            return Ok(Removal::Absent);
        }

        match response.json::<ApiResponse<Value>>().await {
            Ok(body) if body.success => Ok(Removal::Removed),
            Ok(body) => {
                debug!(node = %self.node, inbound_id, label, msg = %body.msg, "Client entry not present");
                Ok(Removal::Absent)
            }
            Err(e) => {
                warn!(node = %self.node, inbound_id, label, error = %e, "Unreadable delete response");
                Ok(Removal::Absent)
            }
        }
    }

    async fn get_inbound(&self, inbound_id: u64) -> Result<Inbound> {
        const OP: &str = "get inbound";
        let response = self
            .http
            .get(self.url(&format!("/inbounds/get/{inbound_id}")))
            .send()
            .await;
        let body = self.envelope::<Inbound>(OP, response).await?;
        match body.obj {
            Some(inbound) if body.success => Ok(inbound),
            _ => Err(PanelError::InboundNotFound(inbound_id)),
        }
    }

    async fn update_inbound(&self, inbound: &Inbound) -> Result<()> {
        const OP: &str = "update inbound";
        let response = self
            .http
            .post(self.url(&format!("/inbounds/update/{}", inbound.id)))
            .json(inbound)
            .send()
            .await;
        Self::accepted(OP, self.envelope::<Value>(OP, response).await?)?;
        Ok(())
    }
}
