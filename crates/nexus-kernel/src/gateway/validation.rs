//! Gateway configuration container and validation.
//!
//! [`GatewayConfig`] aggregates the server, routing, topology and admission
//! sections and exposes a single [`validate()`](GatewayConfig::validate)
//! that checks all structural invariants *before* any runtime resources are
//! allocated.  Every section is defaulted, so an empty file is a valid config.

use super::discovery::DEFAULT_OPERATIONS_METADATA_KEY;
use super::error::GatewayError;
use super::routing::RoutingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

fn default_port() -> u16 {
    8080
}

fn default_client_id_header() -> String {
    "x-client-id".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    30_000
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Header carrying the caller identity.
    #[serde(default = "default_client_id_header")]
    pub client_id_header: String,
    /// Base URL for requests the routing engine passes through.
    #[serde(default)]
    pub default_upstream: Option<String>,
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            client_id_header: default_client_id_header(),
            default_upstream: None,
            upstream_timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_operations_metadata_key() -> String {
    DEFAULT_OPERATIONS_METADATA_KEY.to_string()
}

/// `[topology]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Instance metadata key listing advertised operation names.
    #[serde(default = "default_operations_metadata_key")]
    pub operations_metadata_key: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            operations_metadata_key: default_operations_metadata_key(),
        }
    }
}

impl TopologyConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn default_capacity() -> u64 {
    100
}

fn default_refill_window_secs() -> u64 {
    60
}

/// `[admission]` section: the baseline quota for keys without a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_capacity")]
    pub default_capacity: u64,
    #[serde(default = "default_refill_window_secs")]
    pub default_refill_window_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            default_capacity: default_capacity(),
            default_refill_window_secs: default_refill_window_secs(),
        }
    }
}

impl AdmissionConfig {
    pub fn default_refill_window(&self) -> Duration {
        Duration::from_secs(self.default_refill_window_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level gateway configuration.
///
/// Call [`validate()`](Self::validate) before handing this to the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
}

impl GatewayConfig {
    /// Builder: set the listen port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Builder: set the pass-through upstream.
    pub fn with_default_upstream(mut self, url: impl Into<String>) -> Self {
        self.server.default_upstream = Some(url.into());
        self
    }

    /// Builder: replace the routing section.
    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Builder: set the baseline quota.
    pub fn with_default_quota(mut self, capacity: u64, window_secs: u64) -> Self {
        self.admission.default_capacity = capacity;
        self.admission.default_refill_window_secs = window_secs;
        self
    }

    /// Validate all structural invariants of this configuration.
    ///
    /// Returns the *first* detected [`GatewayError`].  Checks, in order:
    /// 1. Routing: prefix shape, load-balancer scheme, GraphQL paths.
    /// 2. Topology refresh interval is non-zero.
    /// 3. Operations metadata key is non-empty.
    /// 4. Client id header is non-empty.
    /// 5. Default refill window is non-zero.
    /// 6. Upstream timeout is non-zero.
    /// 7. Default upstream, if set, is an http(s) URL.
    pub fn validate(&self) -> Result<(), GatewayError> {
        self.routing.validate()?;

        if self.topology.refresh_interval_secs == 0 {
            return Err(GatewayError::InvalidRefreshInterval);
        }
        if self.topology.operations_metadata_key.trim().is_empty() {
            return Err(GatewayError::EmptyMetadataKey);
        }

        if self.server.client_id_header.trim().is_empty() {
            return Err(GatewayError::EmptyClientIdHeader);
        }
        if self.admission.default_refill_window_secs == 0 {
            return Err(GatewayError::InvalidRateLimitWindow);
        }
        if self.server.upstream_timeout_ms == 0 {
            return Err(GatewayError::InvalidTimeout);
        }
        if let Some(url) = &self.server.default_upstream {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GatewayError::InvalidUpstream(url.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = GatewayConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.client_id_header, "x-client-id");
        assert_eq!(cfg.routing.gateway_prefix, "/api/");
        assert_eq!(cfg.routing.load_balancer_uri, "lb://");
        assert_eq!(cfg.topology.refresh_interval(), Duration::from_secs(60));
        assert_eq!(cfg.topology.operations_metadata_key, "graphql.operations");
        assert_eq!(cfg.admission.default_capacity, 100);
    }

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let cfg: GatewayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, GatewayConfig::default());

        let partial: GatewayConfig =
            serde_json::from_str(r#"{ "routing": { "rest": { "strip_prefix": false } } }"#)
                .unwrap();
        assert!(!partial.routing.rest.strip_prefix);
        assert_eq!(partial.routing.graphql.service_path, "/graphql");
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut cfg = GatewayConfig::default();
        cfg.topology.refresh_interval_secs = 0;
        assert_eq!(cfg.validate(), Err(GatewayError::InvalidRefreshInterval));

        let cfg = GatewayConfig::default().with_default_quota(10, 0);
        assert_eq!(cfg.validate(), Err(GatewayError::InvalidRateLimitWindow));
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut cfg = GatewayConfig::default();
        cfg.server.client_id_header = String::new();
        assert_eq!(cfg.validate(), Err(GatewayError::EmptyClientIdHeader));

        let mut cfg = GatewayConfig::default();
        cfg.topology.operations_metadata_key = " ".into();
        assert_eq!(cfg.validate(), Err(GatewayError::EmptyMetadataKey));
    }

    #[test]
    fn default_upstream_must_be_http() {
        let ok = GatewayConfig::default().with_default_upstream("http://127.0.0.1:9000");
        assert!(ok.validate().is_ok());

        let bad = GatewayConfig::default().with_default_upstream("ftp://files");
        assert!(matches!(bad.validate(), Err(GatewayError::InvalidUpstream(_))));
    }

    #[test]
    fn routing_errors_surface_first() {
        let mut cfg = GatewayConfig::default();
        cfg.routing.graphql.service_path = "graphql".into();
        cfg.topology.refresh_interval_secs = 0;
        assert!(matches!(cfg.validate(), Err(GatewayError::InvalidServicePath(_))));
    }
}
