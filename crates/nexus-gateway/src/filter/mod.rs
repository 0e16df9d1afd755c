//! Filter module.
//!
//! The standard dispatch chain is admission, then routing, then access
//! logging.  The upstream call happens after the last `on_request` hook.

mod admission;
mod logger;
mod routing;

pub use admission::AdmissionFilter;
pub use logger::LoggingFilter;
pub use routing::RoutingFilter;

use crate::admission::AdmissionController;
use crate::routing::RoutingEngine;
use nexus_kernel::gateway::{FilterAction, GatewayContext, GatewayError, GatewayFilter, GatewayResponse};
use std::sync::Arc;

/// Ordered list of boxed filters executed as a pipeline.
///
/// Filters are sorted by [`FilterOrder`](nexus_kernel::gateway::FilterOrder) in
/// ascending order (lowest value runs first on request path).
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
}

impl FilterPipeline {
    /// Build a pipeline from a list of filters, sorted by their declared order.
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// The standard chain: admission, routing, access log.
    pub fn dispatch(
        admission: Arc<AdmissionController>,
        client_id_header: impl Into<String>,
        routing: Arc<RoutingEngine>,
    ) -> Self {
        Self::new(vec![
            Arc::new(LoggingFilter::new()),
            Arc::new(RoutingFilter::new(routing)),
            Arc::new(AdmissionFilter::new(admission, client_id_header)),
        ])
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run all filters' `on_request` hooks in ascending order.
    ///
    /// Returns `Ok(FilterAction::Continue)` if all filters continue.
    /// Short-circuits on the first `Reject` or `Abandon` action.
    pub async fn run_request(
        &self,
        ctx: &mut GatewayContext,
    ) -> Result<FilterAction, GatewayError> {
        for filter in &self.filters {
            match filter.on_request(ctx).await? {
                FilterAction::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(FilterAction::Continue)
    }

    /// Run all filters' `on_response` hooks in descending order
    /// (outermost filter last, so it can finalize latency, etc.).
    pub async fn run_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError> {
        for filter in self.filters.iter().rev() {
            filter.on_response(ctx, resp).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::InMemoryDiscovery;
    use crate::rule_store::InMemoryRuleStore;
    use crate::topology::TopologyCache;
    use nexus_kernel::gateway::{
        AdmissionConfig, DEFAULT_OPERATIONS_METADATA_KEY, GatewayRequest, HttpMethod,
        RateLimitRule, RoutingConfig, UpstreamTarget,
    };

    fn pipeline(rules: Vec<RateLimitRule>) -> FilterPipeline {
        let admission = Arc::new(AdmissionController::new(
            Arc::new(InMemoryRuleStore::from_rules(rules).unwrap()),
            AdmissionConfig::default(),
        ));
        let topology = Arc::new(TopologyCache::new(
            Arc::new(InMemoryDiscovery::new()),
            DEFAULT_OPERATIONS_METADATA_KEY,
        ));
        let routing = Arc::new(RoutingEngine::new(RoutingConfig::default(), topology));
        FilterPipeline::dispatch(admission, "x-client-id", routing)
    }

    fn orders_request() -> GatewayRequest {
        GatewayRequest::new("r1", "/api/order-service/v1/orders", HttpMethod::Get)
    }

    #[test]
    fn dispatch_chain_is_sorted_by_order() {
        let p = pipeline(vec![]);
        assert_eq!(p.names(), vec!["admission", "routing", "access-log"]);
    }

    #[tokio::test]
    async fn admitted_request_gets_a_target() {
        let p = pipeline(vec![]);
        let mut ctx = GatewayContext::new(orders_request().with_header("X-Client-Id", "acme"));

        assert_eq!(p.run_request(&mut ctx).await.unwrap(), FilterAction::Continue);
        assert_eq!(ctx.client_id.as_deref(), Some("acme"));
        assert_eq!(
            ctx.target,
            Some(UpstreamTarget::new("lb://", "order-service", "/v1/orders"))
        );
    }

    #[tokio::test]
    async fn rejection_stops_before_routing() {
        let p = pipeline(vec![]);
        let mut ctx = GatewayContext::new(orders_request());

        let action = p.run_request(&mut ctx).await.unwrap();
        assert!(matches!(action, FilterAction::Reject { status: 400, .. }));
        assert!(ctx.target.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn response_carries_remaining_tokens() {
        let p = pipeline(vec![RateLimitRule::new("acme", "/api/order-service/v1/orders", 3)]);
        let mut ctx = GatewayContext::new(orders_request().with_header("x-client-id", "acme"));
        p.run_request(&mut ctx).await.unwrap();

        let mut resp = GatewayResponse::new(200, "order-service");
        p.run_response(&ctx, &mut resp).await.unwrap();
        assert_eq!(resp.headers.get("x-ratelimit-remaining"), Some("2"));
    }
}
