//! Routing configuration and request classification.
//!
//! Classification is a pure function of the request path and content type;
//! it produces a [`RoutingIntent`] that the runtime routing engine then
//! resolves (GraphQL through the topology snapshot, REST statically).

use super::error::GatewayError;
use super::types::UpstreamTarget;
use serde::{Deserialize, Serialize};

fn default_gateway_prefix() -> String {
    "/api/".to_string()
}

fn default_load_balancer_uri() -> String {
    "lb://".to_string()
}

fn default_graphql_path() -> String {
    "/graphql".to_string()
}

fn default_true() -> bool {
    true
}

/// GraphQL branch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlRoutingConfig {
    /// Requests whose path ends with this suffix are GraphQL candidates.
    #[serde(default = "default_graphql_path")]
    pub endpoint_suffix: String,
    /// Path appended to the resolved service id.
    #[serde(default = "default_graphql_path")]
    pub service_path: String,
}

impl Default for GraphqlRoutingConfig {
    fn default() -> Self {
        Self {
            endpoint_suffix: default_graphql_path(),
            service_path: default_graphql_path(),
        }
    }
}

/// REST branch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestRoutingConfig {
    /// Drop the service-id segment from the forwarded path.
    #[serde(default = "default_true")]
    pub strip_prefix: bool,
}

impl Default for RestRoutingConfig {
    fn default() -> Self {
        Self { strip_prefix: true }
    }
}

/// `[routing]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// REST prefix, e.g. `/api/`.
    #[serde(default = "default_gateway_prefix")]
    pub gateway_prefix: String,
    /// Scheme prefix of rewritten targets, including `://`.
    #[serde(default = "default_load_balancer_uri")]
    pub load_balancer_uri: String,
    #[serde(default)]
    pub graphql: GraphqlRoutingConfig,
    #[serde(default)]
    pub rest: RestRoutingConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            gateway_prefix: default_gateway_prefix(),
            load_balancer_uri: default_load_balancer_uri(),
            graphql: GraphqlRoutingConfig::default(),
            rest: RestRoutingConfig::default(),
        }
    }
}

/// Shape of a request as far as routing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingIntent {
    /// GraphQL endpoint with a JSON-compatible body; the operation name
    /// still has to be extracted.
    Graphql,
    /// Path under the gateway prefix naming a service.
    Rest {
        /// Lower-cased first segment after the prefix.
        service_id: String,
        /// Everything after the prefix, e.g. `Order-Service/v1/orders`.
        internal_path: String,
        /// Remainder after the service segment, starting with `/`.
        remainder: String,
    },
    /// Leave the request untouched.
    PassThrough(PassThroughReason),
}

/// Why a request was classified as pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    /// Neither a GraphQL endpoint nor under the gateway prefix.
    NotRoutable,
    /// Under the gateway prefix but with no `/` after the service segment.
    MalformedRestPath,
}

/// `application/json` or any `application/*+json` media type.
pub fn is_json_compatible(content_type: Option<&str>) -> bool {
    let Some(raw) = content_type else {
        return false;
    };
    let media = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "application/json"
        || media
            .strip_prefix("application/")
            .is_some_and(|sub| sub.ends_with("+json"))
}

impl RoutingConfig {
    /// Classify a request by path and content type.
    ///
    /// GraphQL wins when the path ends with the endpoint suffix *and* the
    /// body is JSON; otherwise the REST prefix rule is tried.
    pub fn classify(&self, path: &str, content_type: Option<&str>) -> RoutingIntent {
        if path.ends_with(&self.graphql.endpoint_suffix) && is_json_compatible(content_type) {
            return RoutingIntent::Graphql;
        }

        let Some(internal) = path.strip_prefix(&self.gateway_prefix) else {
            return RoutingIntent::PassThrough(PassThroughReason::NotRoutable);
        };

        match internal.find('/') {
            Some(idx) if idx >= 1 => RoutingIntent::Rest {
                service_id: internal[..idx].to_lowercase(),
                internal_path: internal.to_string(),
                remainder: internal[idx..].to_string(),
            },
            _ => RoutingIntent::PassThrough(PassThroughReason::MalformedRestPath),
        }
    }

    /// Target for a resolved GraphQL operation.
    pub fn graphql_target(&self, service_id: &str) -> UpstreamTarget {
        UpstreamTarget::new(
            &self.load_balancer_uri,
            service_id,
            &self.graphql.service_path,
        )
    }

    /// Target for a REST intent, honouring `rest.strip_prefix`.
    pub fn rest_target(
        &self,
        service_id: &str,
        internal_path: &str,
        remainder: &str,
    ) -> UpstreamTarget {
        let path = if self.rest.strip_prefix {
            remainder.to_string()
        } else {
            format!("/{internal_path}")
        };
        UpstreamTarget::new(&self.load_balancer_uri, service_id, path)
    }

    pub(crate) fn validate(&self) -> Result<(), GatewayError> {
        let prefix = self.gateway_prefix.trim();
        if prefix.is_empty() {
            return Err(GatewayError::EmptyGatewayPrefix);
        }
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            return Err(GatewayError::InvalidGatewayPrefix(self.gateway_prefix.clone()));
        }
        if !self.load_balancer_uri.contains("://") || self.load_balancer_uri.starts_with("://") {
            return Err(GatewayError::InvalidLoadBalancerUri(
                self.load_balancer_uri.clone(),
            ));
        }
        if !self.graphql.service_path.starts_with('/') {
            return Err(GatewayError::InvalidServicePath(
                self.graphql.service_path.clone(),
            ));
        }
        if !self.graphql.endpoint_suffix.starts_with('/') {
            return Err(GatewayError::InvalidGraphqlSuffix(
                self.graphql.endpoint_suffix.clone(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_compatibility_accepts_parameters_and_suffix_types() {
        assert!(is_json_compatible(Some("application/json")));
        assert!(is_json_compatible(Some("Application/JSON; charset=utf-8")));
        assert!(is_json_compatible(Some("application/graphql+json")));
        assert!(!is_json_compatible(Some("text/plain")));
        assert!(!is_json_compatible(Some("application/graphql")));
        assert!(!is_json_compatible(None));
    }

    #[test]
    fn graphql_requires_suffix_and_json() {
        let cfg = RoutingConfig::default();
        assert_eq!(
            cfg.classify("/graphql", Some("application/json")),
            RoutingIntent::Graphql
        );
        assert_eq!(
            cfg.classify("/graphql", None),
            RoutingIntent::PassThrough(PassThroughReason::NotRoutable)
        );
    }

    #[test]
    fn non_json_graphql_under_prefix_falls_back_to_rest() {
        let cfg = RoutingConfig::default();
        match cfg.classify("/api/user-service/graphql", Some("text/plain")) {
            RoutingIntent::Rest { service_id, .. } => assert_eq!(service_id, "user-service"),
            other => panic!("expected REST intent, got {other:?}"),
        }
    }

    #[test]
    fn rest_paths_split_on_first_slash_and_lowercase_service() {
        let cfg = RoutingConfig::default();
        let intent = cfg.classify("/api/Order-Service/v1/orders", None);
        assert_eq!(
            intent,
            RoutingIntent::Rest {
                service_id: "order-service".into(),
                internal_path: "Order-Service/v1/orders".into(),
                remainder: "/v1/orders".into(),
            }
        );
    }

    #[test]
    fn malformed_rest_paths_pass_through() {
        let cfg = RoutingConfig::default();
        for path in ["/api/order-service", "/api//orders", "/api/"] {
            assert_eq!(
                cfg.classify(path, None),
                RoutingIntent::PassThrough(PassThroughReason::MalformedRestPath),
                "{path}"
            );
        }
        assert_eq!(
            cfg.classify("/health", None),
            RoutingIntent::PassThrough(PassThroughReason::NotRoutable)
        );
    }

    #[test]
    fn rest_target_honours_strip_prefix() {
        let mut cfg = RoutingConfig::default();
        let stripped = cfg.rest_target("order-service", "order-service/v1/orders", "/v1/orders");
        assert_eq!(stripped.uri(), "lb://order-service/v1/orders");

        cfg.rest.strip_prefix = false;
        let kept = cfg.rest_target("order-service", "order-service/v1/orders", "/v1/orders");
        assert_eq!(kept.uri(), "lb://order-service/order-service/v1/orders");
    }

    #[test]
    fn graphql_target_appends_service_path() {
        let cfg = RoutingConfig::default();
        assert_eq!(cfg.graphql_target("user-service").uri(), "lb://user-service/graphql");
    }

    #[test]
    fn validate_catches_bad_prefix_and_scheme() {
        let mut cfg = RoutingConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.gateway_prefix = "  ".into();
        assert_eq!(cfg.validate(), Err(GatewayError::EmptyGatewayPrefix));

        cfg.gateway_prefix = "api/".into();
        assert!(matches!(cfg.validate(), Err(GatewayError::InvalidGatewayPrefix(_))));

        cfg.gateway_prefix = "/api/".into();
        cfg.load_balancer_uri = "lb".into();
        assert!(matches!(cfg.validate(), Err(GatewayError::InvalidLoadBalancerUri(_))));
    }
}
