//! In-memory [`DiscoveryClient`] implementation.

use async_trait::async_trait;
use nexus_kernel::gateway::{DiscoveryClient, DiscoveryError, ServiceInstance};
use parking_lot::RwLock;
use std::collections::HashMap;

/// [`DiscoveryClient`] backed by a `HashMap` of service id to instances.
///
/// Suitable for single-node deployments and tests.  Registry-backed clients
/// (Consul, Eureka, Kubernetes) belong in separate crates.
#[derive(Default)]
pub struct InMemoryDiscovery {
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
}

impl InMemoryDiscovery {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry with a static instance list.
    pub fn from_instances(instances: impl IntoIterator<Item = ServiceInstance>) -> Self {
        let registry = Self::new();
        for instance in instances {
            registry.register(instance);
        }
        registry
    }

    /// Add an instance under its (lower-cased) service id.
    pub fn register(&self, instance: ServiceInstance) {
        self.services
            .write()
            .entry(instance.normalized_id())
            .or_default()
            .push(instance);
    }

    /// Remove every instance of `service_id`.  Returns `false` if none existed.
    pub fn deregister(&self, service_id: &str) -> bool {
        self.services
            .write()
            .remove(&service_id.to_lowercase())
            .is_some()
    }

    /// Remove one instance by endpoint; drops the service once it is empty.
    pub fn deregister_instance(&self, service_id: &str, endpoint: &str) -> bool {
        let key = service_id.to_lowercase();
        let mut services = self.services.write();
        let Some(instances) = services.get_mut(&key) else {
            return false;
        };
        let before = instances.len();
        instances.retain(|inst| inst.endpoint.as_deref() != Some(endpoint));
        let removed = instances.len() != before;
        if instances.is_empty() {
            services.remove(&key);
        }
        removed
    }
}

#[async_trait]
impl DiscoveryClient for InMemoryDiscovery {
    async fn services(&self) -> Result<Vec<String>, DiscoveryError> {
        let mut ids: Vec<String> = self.services.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn instances(&self, service_id: &str) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        Ok(self
            .services
            .read()
            .get(&service_id.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}
