//! Axum-based HTTP gateway server.
//!
//! [`GatewayServer`] wires together the topology cache, admission
//! controller, filter pipeline and upstream forwarder into a running axum
//! service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, always `200 OK`. |
//! | `GET`  | `/internal/rate-limits` | Bucket status per `clientId:route`. |
//! | `GET`  | `/internal/topology` | Current operation map and service set. |
//! | `ANY`  | *anything else* | Admission, routing, then forward upstream. |

use crate::admission::AdmissionController;
use crate::error::{DispatchError, DispatchResult, error_response};
use crate::filter::FilterPipeline;
use crate::routing::RoutingEngine;
use crate::topology::TopologyCache;
use crate::upstream::UpstreamForwarder;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use nexus_kernel::gateway::{
    DiscoveryClient, FilterAction, GatewayConfig, GatewayContext, GatewayRequest,
    GatewayResponse, HttpMethod, RateLimitRuleStore,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status returned when the caller went away before a response existed.
const CLIENT_CLOSED_REQUEST: u16 = 499;

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<FilterPipeline>,
    forwarder: Arc<UpstreamForwarder>,
    admission: Arc<AdmissionController>,
    topology: Arc<TopologyCache>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// High-level gateway server owning all long-lived dispatch state.
pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
}

impl GatewayServer {
    /// Validate `config` and assemble the runtime around the two collaborators.
    pub fn new(
        config: GatewayConfig,
        discovery: Arc<dyn DiscoveryClient>,
        rules: Arc<dyn RateLimitRuleStore>,
    ) -> DispatchResult<Self> {
        config.validate()?;

        let topology = Arc::new(TopologyCache::new(
            discovery.clone(),
            &config.topology.operations_metadata_key,
        ));
        let routing = Arc::new(RoutingEngine::new(config.routing.clone(), topology.clone()));
        let admission = Arc::new(AdmissionController::new(rules, config.admission.clone()));
        let pipeline = Arc::new(FilterPipeline::dispatch(
            admission.clone(),
            &config.server.client_id_header,
            routing,
        ));
        let forwarder = Arc::new(UpstreamForwarder::new(
            discovery,
            config.server.default_upstream.clone(),
            config.server.upstream_timeout(),
        )?);

        Ok(Self {
            config,
            state: AppState {
                pipeline,
                forwarder,
                admission,
                topology,
            },
        })
    }

    pub fn topology(&self) -> &Arc<TopologyCache> {
        &self.state.topology
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.state.admission
    }

    /// Build the axum [`Router`].  Call [`serve()`](Self::serve) to bind.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/internal/rate-limits", get(rate_limits_handler))
            .route("/internal/topology", get(topology_handler))
            .fallback(proxy_handler)
            .with_state(self.state.clone())
    }

    /// Bind to `0.0.0.0:{port}`, start the topology refresher and serve until
    /// `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let refresher = self.state.topology.spawn_refresh_loop(
            self.config.topology.refresh_interval(),
            shutdown.child_token(),
        );

        let app = self.router();
        let addr = format!("0.0.0.0:{}", self.config.server.port);
        info!(addr = %addr, "Nexus gateway starting");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await;

        shutdown.cancel();
        if let Err(err) = refresher.await {
            warn!(error = %err, "topology refresher task failed");
        }
        info!("Nexus gateway stopped");
        served
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "nexus-gateway",
        "topologyReady": state.topology.is_initialized(),
    }))
}

/// `GET /internal/rate-limits`: per-key `availableTokens` / `capacity`.
async fn rate_limits_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.admission.limits())
}

/// `GET /internal/topology`: current snapshot.
async fn topology_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.topology.snapshot().as_ref().clone())
}

/// Generic proxy handler. Runs the filter pipeline then forwards to the
/// target chosen by the routing filter.
async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(http_method) = HttpMethod::from_str_ci(method.as_str()) else {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            format!("method '{method}' is not supported"),
        );
    };

    let request_id = Uuid::new_v4().to_string();
    let mut req = GatewayRequest::new(&request_id, uri.path(), http_method).with_body(body);
    if let Some(query) = uri.query() {
        req = req.with_query(query);
    }
    for (name, value) in &headers {
        if let Ok(v) = value.to_str() {
            req = req.with_header(name.as_str(), v);
        }
    }

    let mut ctx = GatewayContext::new(req);
    // Dropping this future (client disconnect) cancels pending admission retries.
    let _cancel_on_drop = ctx.cancellation.clone().drop_guard();

    match state.pipeline.run_request(&mut ctx).await {
        Ok(FilterAction::Reject {
            status,
            code,
            message,
        }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return error_response(status, code, message);
        }
        Ok(FilterAction::Abandon) => {
            debug!(request_id = %request_id, "request abandoned");
            return StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::BAD_REQUEST)
                .into_response();
        }
        Ok(FilterAction::Continue) => {}
        // FilterAction is #[non_exhaustive]; treat unknown variants as Continue.
        Ok(_) => {}
        Err(err) => return DispatchError::from(err).into_response(),
    }

    let mut gateway_resp = match state.forwarder.forward(&ctx).await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "forwarding failed");
            return err.into_response();
        }
    };

    if let Err(err) = state.pipeline.run_response(&ctx, &mut gateway_resp).await {
        warn!(
            request_id = %request_id,
            error = %err,
            "response filter pipeline error (upstream response still returned)"
        );
    }

    build_axum_response(gateway_resp)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_axum_response(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (k, v) in resp.headers.iter() {
        builder = builder.header(k, v);
    }
    builder.body(Body::from(resp.body)).unwrap_or_else(|err| {
        error_response(
            StatusCode::BAD_GATEWAY,
            "UPSTREAM_ERROR",
            format!("invalid upstream response: {err}"),
        )
    })
}
