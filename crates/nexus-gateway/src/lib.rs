//! `nexus-gateway`: Nexus dispatch runtime.
//!
//! This crate provides the concrete implementations of the gateway kernel
//! contracts defined in `nexus-kernel::gateway`:
//!
//! | Kernel contract | Implementation |
//! |----------------|----------------|
//! | [`DiscoveryClient`] | [`discovery::InMemoryDiscovery`] |
//! | [`RateLimitRuleStore`] | [`rule_store::InMemoryRuleStore`] |
//! | [`GatewayFilter`] | [`filter::AdmissionFilter`], [`filter::RoutingFilter`], [`filter::LoggingFilter`] |
//!
//! The per-request algorithms live in [`topology::TopologyCache`],
//! [`routing::RoutingEngine`] and [`admission::AdmissionController`]; the
//! [`server::GatewayServer`] wires everything together into an axum HTTP
//! service.
//!
//! [`DiscoveryClient`]: nexus_kernel::gateway::DiscoveryClient
//! [`RateLimitRuleStore`]: nexus_kernel::gateway::RateLimitRuleStore
//! [`GatewayFilter`]: nexus_kernel::gateway::GatewayFilter
//!
//! # Quick start
//!
//! ```rust,no_run
//! use nexus_gateway::discovery::InMemoryDiscovery;
//! use nexus_gateway::rule_store::InMemoryRuleStore;
//! use nexus_gateway::server::GatewayServer;
//! use nexus_kernel::gateway::{GatewayConfig, RateLimitRule, ServiceInstance};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let discovery = InMemoryDiscovery::from_instances([ServiceInstance::new("user-service")
//!         .with_endpoint("http://127.0.0.1:7001")
//!         .with_metadata("graphql.operations", "createUser,getUser")]);
//!     let rules = InMemoryRuleStore::from_rules([RateLimitRule::new("acme", "/graphql", 100)])?;
//!
//!     let server = GatewayServer::new(
//!         GatewayConfig::default().with_port(8080),
//!         Arc::new(discovery),
//!         Arc::new(rules),
//!     )?;
//!     server.serve(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod routing;
pub mod rule_store;
pub mod server;
pub mod topology;
pub mod upstream;

// Re-export the kernel gateway types for convenience.
pub use nexus_kernel::gateway;
