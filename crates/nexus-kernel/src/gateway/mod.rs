//! Gateway dispatch kernel contract.
//!
//! This module defines the *trait interfaces and configuration types* of the
//! Nexus dispatch core.  Concrete implementations live in `nexus-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              nexus-kernel  (this module)                    │
//! │  DiscoveryClient trait   RateLimitRuleStore trait           │
//! │  GatewayFilter trait     GatewayConfig + validate()         │
//! │  RoutingConfig::classify → RoutingIntent                    │
//! │  GatewayRequest/Response/Context  GatewayError              │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              nexus-gateway  (runtime crate)                 │
//! │  TopologyCache      RoutingEngine      AdmissionController  │
//! │  AdmissionFilter / RoutingFilter / LoggingFilter            │
//! │  UpstreamForwarder (reqwest)   GatewayServer (axum)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use nexus_kernel::gateway::{GatewayConfig, RoutingIntent};
//!
//! let config = GatewayConfig::default().with_default_upstream("http://127.0.0.1:9000");
//! config.validate().expect("gateway config is valid");
//!
//! let intent = config.routing.classify("/api/order-service/v1/orders", None);
//! assert!(matches!(intent, RoutingIntent::Rest { .. }));
//! ```

pub mod discovery;
pub mod error;
pub mod filter;
pub mod routing;
pub mod rule;
pub mod validation;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use discovery::{
    DEFAULT_OPERATIONS_METADATA_KEY, DiscoveryClient, DiscoveryError, ServiceInstance,
};
pub use error::GatewayError;
pub use filter::{FilterAction, FilterOrder, GatewayFilter};
pub use routing::{
    GraphqlRoutingConfig, PassThroughReason, RestRoutingConfig, RoutingConfig, RoutingIntent,
    is_json_compatible,
};
pub use rule::{
    RateLimitRule, RateLimitRuleStore, RetryPolicy, RuleStatus, RuleStoreError, TimeUnit,
    rule_key,
};
pub use validation::{AdmissionConfig, GatewayConfig, ServerConfig, TopologyConfig};

// types module is pub so implementors in nexus-gateway can use the structs
pub mod types;
pub use types::{
    GatewayContext, GatewayRequest, GatewayResponse, HeaderList, HttpMethod, UpstreamTarget,
};
