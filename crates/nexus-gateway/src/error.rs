//! Runtime dispatch error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nexus_kernel::gateway::GatewayError;
use serde_json::json;
use thiserror::Error;

/// Failures after the filter chain has decided where a request goes.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Pass-through request and no default upstream is configured.
    #[error("no route for '{0}'")]
    NoRoute(String),

    /// The target service has no instance with an endpoint.
    #[error("no live instance of service '{0}'")]
    NoLiveInstance(String),

    /// Discovery could not be queried while resolving an instance.
    #[error("discovery failed for service '{service}': {message}")]
    Discovery { service: String, message: String },

    /// The upstream call itself failed.
    #[error("network error calling '{upstream}': {source}")]
    Network {
        upstream: String,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    /// A filter could not run.
    #[error(transparent)]
    Filter(#[from] GatewayError),
}

impl DispatchError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            DispatchError::NoRoute(_) => (StatusCode::NOT_FOUND, "NO_ROUTE"),
            DispatchError::NoLiveInstance(_) | DispatchError::Discovery { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "NO_LIVE_INSTANCE")
            }
            DispatchError::Network { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            DispatchError::Client(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            DispatchError::Filter(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FILTER_ERROR"),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        error_response(status, code, self.to_string())
    }
}

/// JSON error envelope shared by dispatch errors and filter rejections.
pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message.into(),
        }
    }));

    (status, body).into_response()
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_failure_kind() {
        assert_eq!(
            DispatchError::NoRoute("/x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DispatchError::NoLiveInstance("svc".into())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            DispatchError::Filter(GatewayError::Filter("f".into(), "boom".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
