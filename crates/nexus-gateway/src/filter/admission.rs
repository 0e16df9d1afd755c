//! Admission-control filter.
//!
//! Resolves the caller from the configured client-id header and asks the
//! [`AdmissionController`] for a token.  A missing id is rejected with
//! `400 Bad Request`, an exhausted bucket with `429 Too Many Requests`.

use crate::admission::{Admission, AdmissionController, Denial};
use async_trait::async_trait;
use nexus_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayError, GatewayFilter, GatewayResponse,
};
use std::sync::Arc;

pub(crate) const REMAINING_ATTR: &str = "admission.remaining";

/// Per-client token-bucket filter.
pub struct AdmissionFilter {
    controller: Arc<AdmissionController>,
    client_id_header: String,
}

impl AdmissionFilter {
    pub fn new(controller: Arc<AdmissionController>, client_id_header: impl Into<String>) -> Self {
        Self {
            controller,
            client_id_header: client_id_header.into(),
        }
    }
}

#[async_trait]
impl GatewayFilter for AdmissionFilter {
    fn name(&self) -> &str {
        "admission"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::ADMISSION
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        ctx.client_id = ctx
            .request
            .header(&self.client_id_header)
            .map(str::to_string);

        let admission = self
            .controller
            .try_admit(ctx.client_id.as_deref(), &ctx.request.path, &ctx.cancellation)
            .await;

        Ok(match admission {
            Admission::Allowed { remaining } => {
                ctx.set_attr(REMAINING_ATTR, &remaining);
                FilterAction::Continue
            }
            Admission::Denied(Denial::MissingClientId) => FilterAction::reject(
                400,
                "MISSING_CLIENT_ID",
                format!("missing required header '{}'", self.client_id_header),
            ),
            Admission::Denied(Denial::RateLimited) => FilterAction::reject(
                429,
                "RATE_LIMIT_EXCEEDED",
                format!(
                    "rate limit exceeded for client '{}'",
                    ctx.client_id.as_deref().unwrap_or_default()
                ),
            ),
            Admission::Abandoned => FilterAction::Abandon,
        })
    }

    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError> {
        if let Some(remaining) = ctx.get_attr::<u64>(REMAINING_ATTR) {
            resp.headers
                .insert("x-ratelimit-remaining", remaining.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_store::InMemoryRuleStore;
    use nexus_kernel::gateway::{AdmissionConfig, GatewayRequest, HttpMethod, RateLimitRule};

    fn filter(rules: Vec<RateLimitRule>) -> AdmissionFilter {
        let controller = AdmissionController::new(
            Arc::new(InMemoryRuleStore::from_rules(rules).unwrap()),
            AdmissionConfig::default(),
        );
        AdmissionFilter::new(Arc::new(controller), "X-Client-Id")
    }

    fn ctx(client: Option<&str>) -> GatewayContext {
        let mut req = GatewayRequest::new("r1", "/api/test", HttpMethod::Get);
        if let Some(client) = client {
            req = req.with_header("x-client-id", client);
        }
        GatewayContext::new(req)
    }

    #[tokio::test]
    async fn missing_header_is_bad_request() {
        let action = filter(vec![]).on_request(&mut ctx(None)).await.unwrap();
        assert!(matches!(
            action,
            FilterAction::Reject { status: 400, code: "MISSING_CLIENT_ID", .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bucket_is_too_many_requests() {
        let f = filter(vec![RateLimitRule::new("acme", "/api/test", 1)]);
        assert_eq!(f.on_request(&mut ctx(Some("acme"))).await.unwrap(), FilterAction::Continue);

        let action = f.on_request(&mut ctx(Some("acme"))).await.unwrap();
        assert!(matches!(
            action,
            FilterAction::Reject { status: 429, code: "RATE_LIMIT_EXCEEDED", .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_retry_abandons() {
        let rule = RateLimitRule::new("acme", "/api/test", 1)
            .with_attribute("maxRetries", "5")
            .with_attribute("retryDelayMs", "1000");
        let f = filter(vec![rule]);
        f.on_request(&mut ctx(Some("acme"))).await.unwrap();

        let mut pending = ctx(Some("acme"));
        pending.cancellation.cancel();
        assert_eq!(f.on_request(&mut pending).await.unwrap(), FilterAction::Abandon);
    }
}
