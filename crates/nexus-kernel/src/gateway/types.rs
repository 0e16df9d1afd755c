//! Core data types for the gateway kernel contract.
//!
//! These types are shared across the filter, discovery and rule-store
//! contracts and carry no runtime dependencies beyond `serde`, `bytes` and
//! the request cancellation token.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP primitives
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method, covering the standard verbs used in REST and proxy scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Case-insensitive parse from a string slice.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// Return the standard uppercase string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// Ordered header multimap with lower-cased names.
///
/// Repeated names keep every value in arrival order, so `set-cookie` or a
/// repeated `accept` survives the trip through the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, keeping any existing values of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into().to_lowercase(), value.into()));
    }

    /// Replace every value of `name` with `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.0.retain(|(n, _)| *n != name);
        self.0.push((name, value.into()));
    }

    /// First value of `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value of `name` in arrival order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        let name = name.to_lowercase();
        self.0
            .iter()
            .filter(move |(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound request flowing through the gateway.
///
/// The body is buffered once by the HTTP front end.  Filters that inspect it
/// (e.g. GraphQL operation-name extraction) read from the buffer, and the
/// forwarder replays the same bytes upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Unique identifier for correlating this request across logs.
    pub id: String,
    /// Request path without the query string, e.g. `/api/order-service/v1/orders`.
    pub path: String,
    /// Raw query string (without the leading `?`), if any.
    pub query: Option<String>,
    /// HTTP method.
    pub method: HttpMethod,
    /// HTTP headers (header names are lowercased).
    pub headers: HeaderList,
    /// Buffered body bytes.
    pub body: Bytes,
}

impl GatewayRequest {
    /// Construct a minimal request with the given id, path, and method.
    pub fn new(id: impl Into<String>, path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            query: None,
            method,
            headers: HeaderList::new(),
            body: Bytes::new(),
        }
    }

    /// Builder helper: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    /// Builder helper: set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Builder helper: set the query string.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Value of the `content-type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// An outbound response produced upstream and returned through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// HTTP status code (100–599).
    pub status: u16,
    /// Response headers.
    pub headers: HeaderList,
    /// Raw body bytes.
    pub body: Bytes,
    /// Service id (or `default`) that generated this response.
    pub upstream: String,
    /// Round-trip latency in milliseconds (gateway → upstream → gateway).
    pub latency_ms: u64,
}

impl GatewayResponse {
    /// Construct a minimal response.
    pub fn new(status: u16, upstream: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderList::new(),
            body: Bytes::new(),
            upstream: upstream.into(),
            latency_ms: 0,
        }
    }

    /// Builder helper: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    /// Builder helper: set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream target
// ─────────────────────────────────────────────────────────────────────────────

/// A rewritten upstream URI of the form `<scheme><service_id><path>`,
/// e.g. `lb://order-service/v1/orders`.
///
/// The scheme is the configured load-balancer URI prefix (including `://`);
/// the service id is resolved to a concrete instance by the forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamTarget {
    /// Load-balancer scheme prefix, e.g. `lb://`.
    pub scheme: String,
    /// Lower-cased logical service id.
    pub service_id: String,
    /// Path forwarded to the service (always begins with `/`).
    pub path: String,
}

impl UpstreamTarget {
    pub fn new(
        scheme: impl Into<String>,
        service_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            service_id: service_id.into(),
            path: path.into(),
        }
    }

    /// Full URI string, e.g. `lb://user-service/graphql`.
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, self.service_id, self.path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request context
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable context that flows through the filter chain for a single request.
///
/// Filters read from and write to this context, enabling downstream filters
/// to access decisions made by upstream filters (e.g. the client id resolved
/// by admission control is read by the access logger).
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// The inbound request.
    pub request: GatewayRequest,
    /// Client identity resolved by admission control; `None` until then.
    pub client_id: Option<String>,
    /// Upstream target chosen by the routing filter.  `None` means the request
    /// passes through unmodified to the default route.
    pub target: Option<UpstreamTarget>,
    /// Cancelled when the caller goes away (client disconnect).
    pub cancellation: CancellationToken,
    /// Free-form attributes written and read by filters.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl GatewayContext {
    /// Create a fresh context from an inbound request.
    pub fn new(request: GatewayRequest) -> Self {
        Self {
            request,
            client_id: None,
            target: None,
            cancellation: CancellationToken::new(),
            attributes: HashMap::new(),
        }
    }

    /// Convenience: read a typed attribute, returning `None` if absent or
    /// if deserialization fails.
    pub fn get_attr<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Convenience: write a serializable attribute.
    pub fn set_attr<T: serde::Serialize>(&mut self, key: impl Into<String>, val: &T) {
        if let Ok(v) = serde_json::to_value(val) {
            self.attributes.insert(key.into(), v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let req = GatewayRequest::new("r1", "/graphql", HttpMethod::Post)
            .with_header("Content-Type", "application/json")
            .with_header("X-Client-Id", "acme");
        assert_eq!(req.content_type(), Some("application/json"));
        assert_eq!(req.header("x-client-id"), Some("acme"));
        assert_eq!(req.header("X-CLIENT-ID"), Some("acme"));
    }

    #[test]
    fn repeated_headers_keep_every_value() {
        let mut resp = GatewayResponse::new(200, "svc")
            .with_header("Set-Cookie", "a=1")
            .with_header("set-cookie", "b=2");
        assert_eq!(resp.headers.get_all("SET-COOKIE").collect::<Vec<_>>(), ["a=1", "b=2"]);
        assert_eq!(resp.headers.len(), 2);

        resp.headers.insert("set-cookie", "c=3");
        assert_eq!(resp.headers.get_all("set-cookie").collect::<Vec<_>>(), ["c=3"]);
    }

    #[test]
    fn upstream_target_renders_uri() {
        let target = UpstreamTarget::new("lb://", "order-service", "/v1/orders");
        assert_eq!(target.uri(), "lb://order-service/v1/orders");
    }

    #[test]
    fn context_attributes_round_trip_typed_values() {
        let mut ctx = GatewayContext::new(GatewayRequest::new("r1", "/", HttpMethod::Get));
        ctx.set_attr("log.start_ms", &42u64);
        assert_eq!(ctx.get_attr::<u64>("log.start_ms"), Some(42));
        assert_eq!(ctx.get_attr::<u64>("missing"), None);
        assert!(!ctx.cancellation.is_cancelled());
    }
}
