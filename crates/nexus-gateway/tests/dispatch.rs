//! End-to-end dispatch through the axum app against a real local upstream.

use axum::body::{Body, Bytes, to_bytes};
use axum::http::header::{ACCEPT, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::response::{AppendHeaders, IntoResponse};
use axum::{Json, Router};
use nexus_gateway::discovery::InMemoryDiscovery;
use nexus_gateway::rule_store::InMemoryRuleStore;
use nexus_gateway::server::GatewayServer;
use nexus_kernel::gateway::{
    DEFAULT_OPERATIONS_METADATA_KEY, GatewayConfig, RateLimitRule, ServiceInstance,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// Upstream that echoes what it received and sets two cookies.
async fn echo(uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let accept: Vec<&str> = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    (
        AppendHeaders([(SET_COOKIE, "session=1"), (SET_COOKIE, "theme=dark")]),
        Json(json!({
            "path": uri.path(),
            "query": uri.query(),
            "body": String::from_utf8_lossy(&body),
            "client": headers.get("x-client-id").and_then(|v| v.to_str().ok()),
            "accept": accept,
        })),
    )
}

async fn spawn_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(echo)).await.unwrap();
    });
    addr
}

struct Harness {
    app: Router,
    server: GatewayServer,
}

impl Harness {
    async fn new(config: GatewayConfig, rules: Vec<RateLimitRule>) -> Self {
        let upstream = spawn_upstream().await;
        let discovery = InMemoryDiscovery::from_instances([
            ServiceInstance::new("user-service")
                .with_endpoint(format!("http://{upstream}"))
                .with_metadata(DEFAULT_OPERATIONS_METADATA_KEY, "createUser,getUser"),
            ServiceInstance::new("order-service").with_endpoint(format!("http://{upstream}")),
            ServiceInstance::new("dark-service"),
        ]);
        let rules = InMemoryRuleStore::from_rules(rules).unwrap();
        let server = GatewayServer::new(config, Arc::new(discovery), Arc::new(rules)).unwrap();
        Self {
            app: server.router(),
            server,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }
}

fn get(path: &str, client: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(client) = client {
        builder = builder.header("x-client-id", client);
    }
    builder.body(Body::empty()).unwrap()
}

fn graphql(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/graphql")
        .header("content-type", "application/json")
        .header("x-client-id", "acme")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn graphql_operation_is_forwarded_with_body_intact() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;
    let payload = r#"{"operationName":"createUser","query":"mutation{createUser(name:\"x\"){id}}"}"#;

    let (status, _, body) = h.send(graphql(payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "/graphql");
    assert_eq!(body["body"], payload);
    assert_eq!(body["client"], "acme");
}

#[tokio::test]
async fn rest_request_strips_prefix_and_keeps_query() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;

    let (status, headers, body) = h
        .send(get("/api/Order-Service/v1/orders?page=2", Some("acme")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "/v1/orders");
    assert_eq!(body["query"], "page=2");
    assert_eq!(headers["x-ratelimit-remaining"], "99");
}

#[tokio::test]
async fn repeated_headers_survive_both_directions() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;
    let req = Request::builder()
        .method("GET")
        .uri("/api/order-service/v1/orders")
        .header("x-client-id", "acme")
        .header("accept", "application/json")
        .header("accept", "text/plain")
        .body(Body::empty())
        .unwrap();

    let (status, headers, body) = h.send(req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accept"], json!(["application/json", "text/plain"]));
    let cookies: Vec<_> = headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cookies, ["session=1", "theme=dark"]);
}

#[tokio::test]
async fn missing_client_id_is_rejected_before_routing() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;

    let (status, _, body) = h.send(get("/api/order-service/v1/orders", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_CLIENT_ID");
    assert!(h.server.admission().limits().is_empty());
}

#[tokio::test]
async fn exhausted_bucket_returns_429() {
    let rule = RateLimitRule::new("acme", "/api/order-service/v1/orders", 2);
    let h = Harness::new(GatewayConfig::default(), vec![rule]).await;

    for _ in 0..2 {
        let (status, _, _) = h.send(get("/api/order-service/v1/orders", Some("acme"))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, body) = h.send(get("/api/order-service/v1/orders", Some("acme"))).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn unroutable_request_without_default_upstream_is_404() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;

    let (status, _, body) = h.send(get("/static/app.js", Some("acme"))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NO_ROUTE");
}

#[tokio::test]
async fn unmapped_operation_passes_through_to_default_upstream() {
    let upstream = spawn_upstream().await;
    let config = GatewayConfig::default().with_default_upstream(format!("http://{upstream}"));
    let h = Harness::new(config, vec![]).await;

    let (status, _, body) = h.send(graphql(r#"{"operationName":"unknownOp"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "/graphql");
}

#[tokio::test]
async fn service_without_endpoints_is_503() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;

    let (status, _, body) = h.send(get("/api/dark-service/ping", Some("acme"))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "NO_LIVE_INSTANCE");
}

#[tokio::test]
async fn rate_limit_monitor_reports_rule_capacity_or_minus_one() {
    let rule = RateLimitRule::new("client-1", "/api/order-service/v1/orders", 50).with_burst(10);
    let h = Harness::new(GatewayConfig::default(), vec![rule]).await;

    let (_, _, empty) = h.send(get("/internal/rate-limits", None)).await;
    assert_eq!(empty, json!({}));

    h.send(get("/api/order-service/v1/orders", Some("client-1"))).await;
    h.send(get("/api/order-service/v1/orders", Some("client-2"))).await;
    let (status, _, body) = h.send(get("/internal/rate-limits", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client-1:/api/order-service/v1/orders"]["capacity"], 60);
    assert_eq!(body["client-2:/api/order-service/v1/orders"]["capacity"], -1);
    assert!(body["client-1:/api/order-service/v1/orders"]["availableTokens"].is_u64());
}

#[tokio::test]
async fn topology_endpoint_reflects_first_refresh() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;
    h.server.topology().ensure_initialized().await;

    let (status, _, body) = h.send(get("/internal/topology", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operations"]["createUser"], "user-service");
    assert_eq!(
        body["active_services"],
        json!(["dark-service", "order-service", "user-service"])
    );
}

#[tokio::test]
async fn health_is_always_ok() {
    let h = Harness::new(GatewayConfig::default(), vec![]).await;
    let (status, _, body) = h.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
