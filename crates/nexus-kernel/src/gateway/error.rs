//! Gateway error types for `nexus-kernel`.
//!
//! [`GatewayError`] covers failures detected at *definition time* (invalid
//! prefixes, zero intervals, malformed rules) plus the catch-all
//! [`GatewayError::Filter`] a filter may return when it cannot run at all.
//! Upstream/network failures belong in the runtime crate (`nexus-gateway`).

use thiserror::Error;

/// Configuration and filter-contract error type.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    // ── Routing ──────────────────────────────────────────────────────────────
    /// `routing.gateway_prefix` is empty or whitespace-only.
    #[error("gateway prefix cannot be empty")]
    EmptyGatewayPrefix,

    /// `routing.gateway_prefix` is not of the form `/segment/`.
    #[error("gateway prefix '{0}' must start and end with '/'")]
    InvalidGatewayPrefix(String),

    /// `routing.load_balancer_uri` is empty or lacks `://`.
    #[error("load balancer URI '{0}' must look like 'scheme://'")]
    InvalidLoadBalancerUri(String),

    /// `routing.graphql.service_path` does not start with `/`.
    #[error("graphql service path '{0}' must start with '/'")]
    InvalidServicePath(String),

    /// `routing.graphql.endpoint_suffix` does not start with `/`.
    #[error("graphql endpoint suffix '{0}' must start with '/'")]
    InvalidGraphqlSuffix(String),

    // ── Topology ─────────────────────────────────────────────────────────────
    /// `topology.refresh_interval_secs` is zero.
    #[error("topology refresh interval must be greater than 0 seconds")]
    InvalidRefreshInterval,

    /// `topology.operations_metadata_key` is empty.
    #[error("operations metadata key cannot be empty")]
    EmptyMetadataKey,

    // ── Admission ────────────────────────────────────────────────────────────
    /// `server.client_id_header` is empty.
    #[error("client id header name cannot be empty")]
    EmptyClientIdHeader,

    /// The default refill window is zero, which would make refill undefined.
    #[error("default rate-limit refill window must be greater than 0 seconds")]
    InvalidRateLimitWindow,

    /// A rate-limit rule is structurally invalid.
    #[error("rate-limit rule '{0}' is invalid: {1}")]
    InvalidRule(String, String),

    // ── Server ───────────────────────────────────────────────────────────────
    /// `server.default_upstream` is not an http(s) URL.
    #[error("default upstream '{0}' must start with http:// or https://")]
    InvalidUpstream(String),

    /// `server.upstream_timeout_ms` is zero.
    #[error("upstream timeout must be greater than 0 ms")]
    InvalidTimeout,

    // ── Runtime ──────────────────────────────────────────────────────────────
    /// A filter failed in a way that prevents the pipeline from continuing.
    #[error("filter '{0}' failed: {1}")]
    Filter(String, String),
}
