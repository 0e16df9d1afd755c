//! Routing decision engine.
//!
//! Classifies each request with [`RoutingConfig::classify`], then resolves
//! GraphQL operations through the [`TopologyCache`] and REST paths through
//! the static prefix rule.  Every failure mode degrades to
//! [`RoutingDecision::PassThrough`]; nothing here fails a request.

use crate::topology::TopologyCache;
use nexus_kernel::gateway::{PassThroughReason, RoutingConfig, RoutingIntent, UpstreamTarget};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Forward to this target; the body is replayed unchanged.
    Rewrite(UpstreamTarget),
    /// Leave the request as-is for default routing downstream.
    PassThrough,
}

/// Text of a JSON scalar; containers and `null` have none.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Operation name of a GraphQL JSON body.
///
/// A non-null `operationName` decides on its own: its text is the name, and
/// an empty text means there is none. Only when the field is absent or null
/// is the first token after the first `{` of `query` used, ending at
/// whitespace or `(`.
pub fn extract_operation_name(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        debug!("graphql request without body");
        return None;
    }
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "unparseable graphql body");
            return None;
        }
    };

    if let Some(field) = payload.get("operationName").filter(|v| !v.is_null()) {
        return scalar_text(field).filter(|name| !name.trim().is_empty());
    }

    let query = payload.get("query").and_then(scalar_text)?;
    let (_, after_brace) = query.split_once('{')?;
    let name = after_brace
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(' || c == '{' || c == '}')
        .next()
        .unwrap_or_default();
    (!name.is_empty()).then(|| name.to_string())
}

/// Computes the upstream target of each request.
pub struct RoutingEngine {
    config: RoutingConfig,
    topology: Arc<TopologyCache>,
}

impl RoutingEngine {
    pub fn new(config: RoutingConfig, topology: Arc<TopologyCache>) -> Self {
        Self { config, topology }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn topology(&self) -> &Arc<TopologyCache> {
        &self.topology
    }

    /// Decide where `path` goes.  Emits exactly one log line per call.
    ///
    /// GraphQL lookups wait for the first topology load; afterwards they
    /// only read the current snapshot.  An unmapped operation triggers a
    /// background refresh and passes through this once.
    pub async fn route(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> RoutingDecision {
        match self.config.classify(path, content_type) {
            RoutingIntent::Graphql => self.route_graphql(path, body).await,
            RoutingIntent::Rest {
                service_id,
                internal_path,
                remainder,
            } => {
                let target = self
                    .config
                    .rest_target(&service_id, &internal_path, &remainder);
                info!(path = %path, service = %service_id, target = %target, "rest route");
                RoutingDecision::Rewrite(target)
            }
            RoutingIntent::PassThrough(PassThroughReason::MalformedRestPath) => {
                warn!(path = %path, "malformed gateway path, passing through");
                RoutingDecision::PassThrough
            }
            RoutingIntent::PassThrough(PassThroughReason::NotRoutable) => {
                debug!(path = %path, "no routing rule applies, passing through");
                RoutingDecision::PassThrough
            }
        }
    }

    async fn route_graphql(&self, path: &str, body: &[u8]) -> RoutingDecision {
        let Some(operation) = extract_operation_name(body) else {
            debug!(path = %path, "graphql operation name not found, passing through");
            return RoutingDecision::PassThrough;
        };

        self.topology.ensure_initialized().await;

        match self.topology.resolve(&operation) {
            Some(service_id) => {
                let target = self.config.graphql_target(&service_id);
                info!(
                    path = %path,
                    operation = %operation,
                    service = %service_id,
                    target = %target,
                    "graphql route"
                );
                RoutingDecision::Rewrite(target)
            }
            None => {
                info!(
                    path = %path,
                    operation = %operation,
                    "unmapped graphql operation, refreshing topology and passing through"
                );
                self.topology.trigger_refresh();
                RoutingDecision::PassThrough
            }
        }
    }
}
