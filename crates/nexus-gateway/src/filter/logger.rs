//! Dispatch log.
//!
//! Runs after admission and routing, so the request side captures what
//! those filters decided (target or pass-through, tokens left) into a
//! [`DispatchRecord`]. The response side emits one summary event per
//! forwarded request whose level follows the status class.

use super::admission::REMAINING_ATTR;
use async_trait::async_trait;
use nexus_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayError, GatewayFilter, GatewayResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

const RECORD_ATTR: &str = "log.dispatch";

/// What the request filters decided, kept until the response is logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Rewritten upstream URI, `None` for pass-through.
    pub target: Option<String>,
    /// Tokens left in the caller's bucket after admission.
    pub remaining: Option<u64>,
    pub started_at_ms: u64,
}

impl DispatchRecord {
    fn route_kind(&self) -> &'static str {
        if self.target.is_some() {
            "rewrite"
        } else {
            "pass-through"
        }
    }
}

#[derive(Default)]
pub struct LoggingFilter;

impl LoggingFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayFilter for LoggingFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::LOGGING
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        let record = DispatchRecord {
            target: ctx.target.as_ref().map(|t| t.uri()),
            remaining: ctx.get_attr(REMAINING_ATTR),
            started_at_ms: now_ms(),
        };
        debug!(
            request_id = %ctx.request.id,
            method = ctx.request.method.as_str(),
            path = %ctx.request.path,
            client = ?ctx.client_id,
            route = record.route_kind(),
            "admitted request"
        );
        ctx.set_attr(RECORD_ATTR, &record);
        Ok(FilterAction::Continue)
    }

    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError> {
        let Some(record) = ctx.get_attr::<DispatchRecord>(RECORD_ATTR) else {
            return Ok(());
        };
        let elapsed = now_ms().saturating_sub(record.started_at_ms);
        resp.latency_ms = elapsed;

        let uri = record.target.as_deref().unwrap_or("-");
        macro_rules! summary {
            ($level:ident, $msg:tt) => {
                $level!(
                    request_id = %ctx.request.id,
                    client = ctx.client_id.as_deref().unwrap_or("-"),
                    route = record.route_kind(),
                    uri,
                    upstream = %resp.upstream,
                    status = resp.status,
                    remaining = ?record.remaining,
                    latency_ms = elapsed,
                    $msg
                )
            };
        }
        match resp.status {
            500.. => summary!(error, "upstream failed"),
            400..=499 => summary!(warn, "upstream refused"),
            _ => summary!(info, "request dispatched"),
        }
        Ok(())
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_kernel::gateway::{GatewayRequest, HttpMethod, UpstreamTarget};

    fn ctx() -> GatewayContext {
        GatewayContext::new(GatewayRequest::new("r1", "/graphql", HttpMethod::Post))
    }

    #[tokio::test]
    async fn captures_routing_and_admission_outcome() {
        let filter = LoggingFilter::new();
        let mut ctx = ctx();
        ctx.target = Some(UpstreamTarget::new("lb://", "user-service", "/graphql"));
        ctx.set_attr(REMAINING_ATTR, &7u64);

        filter.on_request(&mut ctx).await.unwrap();

        let record: DispatchRecord = ctx.get_attr(RECORD_ATTR).unwrap();
        assert_eq!(record.target.as_deref(), Some("lb://user-service/graphql"));
        assert_eq!(record.remaining, Some(7));
        assert_eq!(record.route_kind(), "rewrite");
    }

    #[tokio::test]
    async fn pass_through_is_recorded_without_target() {
        let filter = LoggingFilter::new();
        let mut ctx = ctx();

        filter.on_request(&mut ctx).await.unwrap();

        let record: DispatchRecord = ctx.get_attr(RECORD_ATTR).unwrap();
        assert_eq!(record.route_kind(), "pass-through");
        assert_eq!(record.remaining, None);
    }

    #[tokio::test]
    async fn response_gets_latency_from_record() {
        let filter = LoggingFilter::new();
        let mut ctx = ctx();
        ctx.set_attr(
            RECORD_ATTR,
            &DispatchRecord {
                target: None,
                remaining: None,
                started_at_ms: now_ms().saturating_sub(250),
            },
        );
        let mut resp = GatewayResponse::new(502, "default");

        filter.on_response(&ctx, &mut resp).await.unwrap();

        assert!(resp.latency_ms >= 250 && resp.latency_ms < 10_000);
    }

    #[tokio::test]
    async fn response_without_record_is_left_alone() {
        let mut resp = GatewayResponse::new(200, "default");
        resp.latency_ms = 42;

        LoggingFilter::new()
            .on_response(&ctx(), &mut resp)
            .await
            .unwrap();

        assert_eq!(resp.latency_ms, 42);
    }
}
