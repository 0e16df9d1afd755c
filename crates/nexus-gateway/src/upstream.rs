//! Load-balanced upstream forwarder.
//!
//! [`UpstreamForwarder`] turns the routing decision stored in the
//! [`GatewayContext`] into an HTTP call:
//!
//! | Context target | Base URL |
//! |----------------|----------|
//! | `lb://svc/...` | endpoint of a live `svc` instance, round-robin |
//! | `http://svc/...` | used verbatim |
//! | none (pass-through) | `server.default_upstream`, else `404 NO_ROUTE` |
//!
//! The buffered request body is replayed byte-for-byte and the query string
//! is preserved.  Upstream responses, including 5xx, are relayed verbatim.

use crate::error::{DispatchError, DispatchResult};
use dashmap::DashMap;
use nexus_kernel::gateway::{
    DiscoveryClient, GatewayContext, GatewayResponse, HeaderList, UpstreamTarget,
};
use reqwest::{Client, Method};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-connection",
    "te",
    "trailer",
];

/// Label used for pass-through responses.
pub const DEFAULT_UPSTREAM_LABEL: &str = "default";

pub struct UpstreamForwarder {
    client: Client,
    discovery: Arc<dyn DiscoveryClient>,
    default_upstream: Option<String>,
    cursors: DashMap<String, AtomicUsize>,
}

/// Where one request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Destination {
    base: String,
    path: String,
    label: String,
}

impl UpstreamForwarder {
    pub fn new(
        discovery: Arc<dyn DiscoveryClient>,
        default_upstream: Option<String>,
        timeout: Duration,
    ) -> DispatchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DispatchError::Client)?;

        Ok(Self {
            client,
            discovery,
            default_upstream: default_upstream.map(|u| u.trim_end_matches('/').to_string()),
            cursors: DashMap::new(),
        })
    }

    async fn destination(&self, ctx: &GatewayContext) -> DispatchResult<Destination> {
        match &ctx.target {
            Some(target) => self.resolve_target(target).await,
            None => match &self.default_upstream {
                Some(base) => Ok(Destination {
                    base: base.clone(),
                    path: ctx.request.path.clone(),
                    label: DEFAULT_UPSTREAM_LABEL.to_string(),
                }),
                None => Err(DispatchError::NoRoute(ctx.request.path.clone())),
            },
        }
    }

    async fn resolve_target(&self, target: &UpstreamTarget) -> DispatchResult<Destination> {
        if matches!(target.scheme.as_str(), "http://" | "https://") {
            return Ok(Destination {
                base: format!("{}{}", target.scheme, target.service_id),
                path: target.path.clone(),
                label: target.service_id.clone(),
            });
        }

        let instances = self
            .discovery
            .instances(&target.service_id)
            .await
            .map_err(|e| DispatchError::Discovery {
                service: target.service_id.clone(),
                message: e.to_string(),
            })?;
        let endpoints: Vec<String> = instances
            .into_iter()
            .filter_map(|inst| inst.endpoint)
            .collect();
        if endpoints.is_empty() {
            return Err(DispatchError::NoLiveInstance(target.service_id.clone()));
        }

        let next = self
            .cursors
            .entry(target.service_id.clone())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
        let endpoint = &endpoints[next % endpoints.len()];

        Ok(Destination {
            base: endpoint.trim_end_matches('/').to_string(),
            path: target.path.clone(),
            label: target.service_id.clone(),
        })
    }

    /// Send the request in `ctx` to its destination and collect the response.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request.id, path = %ctx.request.path))]
    pub async fn forward(&self, ctx: &GatewayContext) -> DispatchResult<GatewayResponse> {
        let dest = self.destination(ctx).await?;
        let mut url = format!("{}{}", dest.base, dest.path);
        if let Some(query) = ctx.request.query.as_deref().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        debug!(url = %url, upstream = %dest.label, "forwarding request");

        let method =
            Method::from_bytes(ctx.request.method.as_str().as_bytes()).unwrap_or(Method::GET);
        let mut builder = self.client.request(method, &url);
        for (key, value) in ctx.request.headers.iter() {
            if HOP_BY_HOP.contains(&key) {
                continue;
            }
            builder = builder.header(key, value);
        }
        builder = builder.header("x-request-id", &ctx.request.id);
        if !ctx.request.body.is_empty() {
            builder = builder.body(ctx.request.body.clone());
        }

        let start = Instant::now();
        let network = |source| DispatchError::Network {
            upstream: dest.label.clone(),
            source,
        };
        let upstream_resp = builder.send().await.map_err(network)?;
        let status = upstream_resp.status().as_u16();

        let mut headers = HeaderList::new();
        for (name, value) in upstream_resp.headers() {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            if let Ok(v) = value.to_str() {
                headers.append(name.as_str(), v);
            }
        }
        let body = upstream_resp.bytes().await.map_err(network)?;

        let mut resp = GatewayResponse::new(status, &dest.label).with_body(body);
        resp.headers = headers;
        resp.latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::InMemoryDiscovery;
    use nexus_kernel::gateway::{GatewayRequest, HttpMethod, ServiceInstance};

    fn forwarder(discovery: InMemoryDiscovery, default: Option<&str>) -> UpstreamForwarder {
        UpstreamForwarder::new(
            Arc::new(discovery),
            default.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn ctx_with_target(target: Option<UpstreamTarget>) -> GatewayContext {
        let mut ctx = GatewayContext::new(GatewayRequest::new("r1", "/graphql", HttpMethod::Post));
        ctx.target = target;
        ctx
    }

    #[tokio::test]
    async fn lb_targets_rotate_over_instances_with_endpoints() {
        let fwd = forwarder(
            InMemoryDiscovery::from_instances([
                ServiceInstance::new("orders").with_endpoint("http://a:1/"),
                ServiceInstance::new("orders"),
                ServiceInstance::new("orders").with_endpoint("http://b:2"),
            ]),
            None,
        );
        let target = UpstreamTarget::new("lb://", "orders", "/v1/orders");

        let first = fwd.resolve_target(&target).await.unwrap();
        let second = fwd.resolve_target(&target).await.unwrap();
        let third = fwd.resolve_target(&target).await.unwrap();

        assert_eq!(first.base, "http://a:1");
        assert_eq!(second.base, "http://b:2");
        assert_eq!(third.base, "http://a:1");
        assert_eq!(first.path, "/v1/orders");
    }

    #[tokio::test]
    async fn missing_instances_are_service_unavailable() {
        let fwd = forwarder(
            InMemoryDiscovery::from_instances([ServiceInstance::new("orders")]),
            None,
        );
        let err = fwd
            .resolve_target(&UpstreamTarget::new("lb://", "orders", "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoLiveInstance(s) if s == "orders"));
    }

    #[tokio::test]
    async fn pass_through_uses_default_upstream_or_fails() {
        let with_default = forwarder(InMemoryDiscovery::new(), Some("http://fallback:9000/"));
        let dest = with_default.destination(&ctx_with_target(None)).await.unwrap();
        assert_eq!(dest.base, "http://fallback:9000");
        assert_eq!(dest.path, "/graphql");
        assert_eq!(dest.label, DEFAULT_UPSTREAM_LABEL);

        let without = forwarder(InMemoryDiscovery::new(), None);
        assert!(matches!(
            without.destination(&ctx_with_target(None)).await,
            Err(DispatchError::NoRoute(_))
        ));
    }

    #[tokio::test]
    async fn direct_http_targets_skip_discovery() {
        let fwd = forwarder(InMemoryDiscovery::new(), None);
        let dest = fwd
            .destination(&ctx_with_target(Some(UpstreamTarget::new(
                "http://",
                "svc.internal:8080",
                "/graphql",
            ))))
            .await
            .unwrap();
        assert_eq!(dest.base, "http://svc.internal:8080");
    }
}
