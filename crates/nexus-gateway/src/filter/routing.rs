//! Routing filter: stores the [`RoutingEngine`] decision in the context.

use crate::routing::{RoutingDecision, RoutingEngine};
use async_trait::async_trait;
use nexus_kernel::gateway::{FilterAction, FilterOrder, GatewayContext, GatewayError, GatewayFilter};
use std::sync::Arc;

pub struct RoutingFilter {
    engine: Arc<RoutingEngine>,
}

impl RoutingFilter {
    pub fn new(engine: Arc<RoutingEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl GatewayFilter for RoutingFilter {
    fn name(&self) -> &str {
        "routing"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::ROUTING
    }

    /// Never rejects: an unroutable request continues with no target.
    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        let decision = self
            .engine
            .route(
                &ctx.request.path,
                ctx.request.content_type(),
                &ctx.request.body,
            )
            .await;

        ctx.target = match decision {
            RoutingDecision::Rewrite(target) => Some(target),
            RoutingDecision::PassThrough => None,
        };
        Ok(FilterAction::Continue)
    }
}
