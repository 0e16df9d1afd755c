//! Service discovery contract.
//!
//! The gateway never owns the service registry.  It reads it through the
//! [`DiscoveryClient`] trait: "list all service ids" and "list the instances
//! (with metadata) of one service id".  Implementations backed by a static
//! table, Consul, Eureka, Kubernetes endpoints, ... live outside the kernel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Metadata key under which instances advertise the GraphQL operations they
/// serve, as a comma-separated list (`createUser,updateUser`).
pub const DEFAULT_OPERATIONS_METADATA_KEY: &str = "graphql.operations";

/// Failure reported by a [`DiscoveryClient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The registry could not be reached or refused the query.
    #[error("discovery source unavailable: {0}")]
    Unavailable(String),

    /// The registry answered with something that could not be interpreted.
    #[error("invalid discovery response: {0}")]
    InvalidResponse(String),
}

/// One running instance of a downstream service.
///
/// Instances are ephemeral: the gateway re-reads them on every topology
/// refresh and never persists them.  Several instances share a `service_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstance {
    /// Logical service id (compared case-insensitively).
    pub service_id: String,
    /// Base URL of this instance, e.g. `http://10.0.0.7:8080`.  Instances
    /// without an endpoint still contribute to the topology but cannot be
    /// forwarded to.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Free-form instance metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Construct an instance with no endpoint and no metadata.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            endpoint: None,
            metadata: HashMap::new(),
        }
    }

    /// Builder: set the instance base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Builder: attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Lower-cased service id used as the routing key.
    pub fn normalized_id(&self) -> String {
        self.service_id.to_lowercase()
    }

    /// Operation names advertised under `metadata_key`: split on `,`,
    /// trimmed, empty entries dropped.
    pub fn advertised_operations(&self, metadata_key: &str) -> Vec<String> {
        self.metadata
            .get(metadata_key)
            .map(|ops| {
                ops.split(',')
                    .map(str::trim)
                    .filter(|op| !op.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Kernel contract for the discovery collaborator.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// All service ids currently known to the registry.
    async fn services(&self) -> Result<Vec<String>, DiscoveryError>;

    /// Instances (with metadata) registered under `service_id`.
    async fn instances(&self, service_id: &str) -> Result<Vec<ServiceInstance>, DiscoveryError>;
}
