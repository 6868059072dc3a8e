use super::headers::end_to_end_headers;
use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, Method, Response};
use std::time::Duration;
use thiserror::Error;

/// Failure reaching a backend or reading its response
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to connect to backend: {0}")]
    Connect(String),

    #[error("backend request timed out: {0}")]
    Timeout(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("backend request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout(e.to_string())
        } else if e.is_connect() {
            BackendError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            BackendError::InvalidResponse(e.to_string())
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

/// A fully rewritten request ready to go to a backend
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Performs the outbound call for an admitted request
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Send `request` and return the backend's response with its body still
    /// streaming
    async fn send(&self, request: BackendRequest) -> Result<Response<Body>, BackendError>;
}

/// HTTP transport over a pooled `reqwest` client
///
/// `timeout` bounds connecting and waiting for the response head. Once the
/// status and headers are in, the body streams for as long as the backend
/// keeps sending it.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| BackendError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl BackendTransport for HttpTransport {
    async fn send(&self, request: BackendRequest) -> Result<Response<Body>, BackendError> {
        let pending = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send();

        let backend_response = tokio::time::timeout(self.timeout, pending)
            .await
            .map_err(|_| {
                BackendError::Timeout(format!(
                    "no response from {} within {:?}",
                    request.url, self.timeout
                ))
            })??;

        let mut response_builder = Response::builder().status(backend_response.status());
        if let Some(headers) = response_builder.headers_mut() {
            *headers = end_to_end_headers(backend_response.headers());
        }

        response_builder
            .body(Body::from_stream(backend_response.bytes_stream()))
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}
