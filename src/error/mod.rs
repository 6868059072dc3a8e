use crate::proxy::headers::insert_rate_limit_headers;
use crate::proxy::transport::BackendError;
use crate::rate_limit::{RateLimitResult, StoreError};
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// A configuration value failed validation.
///
/// `field` is the path of the offending value, e.g. `Port` or
/// `Resources[0].Endpoint`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("config validation error in field '{field}': {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Proxy error types
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Rate limit exceeded for client {client}")]
    RateLimited {
        client: String,
        limit: u32,
        reset_after: u64,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Backend(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Config(_)
            | ProxyError::ConfigLoad(_)
            | ProxyError::Store(_)
            | ProxyError::Internal(_)
            | ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal causes never leave the process.
    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::NOT_FOUND => "Not found",
            StatusCode::TOO_MANY_REQUESTS => "Too many requests",
            StatusCode::BAD_GATEWAY => "Bad Gateway",
            _ => "An error has occurred",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.public_message() }));

        let mut headers = HeaderMap::new();
        if let ProxyError::RateLimited {
            limit, reset_after, ..
        } = &self
        {
            insert_rate_limit_headers(
                &mut headers,
                &RateLimitResult::denied(*limit, *reset_after),
            );
            headers.insert(http::header::RETRY_AFTER, HeaderValue::from(*reset_after));
        }

        (status, headers, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ProxyError::RouteNotFound("/x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::Store(StoreError::Timeout(Duration::from_millis(5))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::Backend(BackendError::Connect("refused".to_string())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::RateLimited {
                client: "10.0.0.1".to_string(),
                limit: 20,
                reset_after: 30,
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::new("Resources[0].Port", "port must be between 1 and 65535");
        assert_eq!(
            err.to_string(),
            "config validation error in field 'Resources[0].Port': port must be between 1 and 65535"
        );
    }

    #[tokio::test]
    async fn test_store_error_body_hides_cause() {
        let err = ProxyError::Store(StoreError::Unavailable(
            "redis://secret-host:6379 refused".to_string(),
        ));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body = body_string(response).await;
        assert_eq!(body, r#"{"error":"An error has occurred"}"#);
    }

    #[tokio::test]
    async fn test_rate_limited_response_headers() {
        let response = ProxyError::RateLimited {
            client: "10.0.0.1".to_string(),
            limit: 20,
            reset_after: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "20");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert_eq!(headers.get("retry-after").unwrap(), "42");

        let body = body_string(response).await;
        assert_eq!(body, r#"{"error":"Too many requests"}"#);
    }
}
