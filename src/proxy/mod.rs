pub mod headers;
pub mod transport;

use crate::error::{ProxyError, Result};
use crate::metrics::{self, Timer, UNMATCHED_ENDPOINT};
use crate::rate_limit::{ClientId, RateLimiter};
use crate::router::RouteTable;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response},
};
use http_body_util::BodyExt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use self::headers::{forwarded_request_headers, insert_rate_limit_headers};
use self::transport::{BackendRequest, BackendTransport};

/// Shared, read-only state for the dispatcher
#[derive(Clone)]
pub struct ProxyState {
    pub routes: Arc<RouteTable>,
    pub limiter: Arc<RateLimiter>,
    pub transport: Arc<dyn BackendTransport>,
}

impl ProxyState {
    pub fn new(
        routes: RouteTable,
        limiter: RateLimiter,
        transport: Arc<dyn BackendTransport>,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            limiter: Arc::new(limiter),
            transport,
        }
    }
}

/// Peer address of the request. Without connect info every request would
/// share the loopback bucket, so that fallback is logged.
fn client_ip(connect_info: Option<ConnectInfo<SocketAddr>>) -> IpAddr {
    match connect_info {
        Some(ConnectInfo(addr)) => addr.ip(),
        None => {
            warn!("No peer address on request; serve with connect info to rate limit per client");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Dispatch one inbound request: resolve the route, consume the client's
/// quota, then forward to the backend and relay its response.
#[axum::debug_handler]
pub async fn proxy_handler(
    State(state): State<ProxyState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<Body>,
) -> Result<Response<Body>> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path();
    let client_ip = client_ip(connect_info);
    let client = ClientId::from_ip(client_ip);

    debug!(
        method = %method,
        path = %path,
        client = %client,
        "Incoming request"
    );

    let route = match state.routes.resolve(path) {
        Ok(route) => route,
        Err(e) => {
            info!(method = %method, path = %path, client = %client, status = 404, "No route for path");
            Timer::new(UNMATCHED_ENDPOINT).record(404);
            return Err(e);
        }
    };

    let timer = Timer::new(route.endpoint.as_str());

    let quota = match state.limiter.consume(&client).await {
        Ok(quota) => quota,
        Err(e) => {
            error!(client = %client, error = %e, "Rate limit store unavailable");
            metrics::record_store_error();
            timer.record(500);
            return Err(ProxyError::Store(e));
        }
    };
    metrics::record_rate_limit_decision(quota.allowed);

    if !quota.allowed {
        info!(
            client = %client,
            path = %path,
            reset_after = quota.reset_after,
            "Rate limit exceeded"
        );
        timer.record(429);
        return Err(ProxyError::RateLimited {
            client: client.to_string(),
            limit: quota.limit,
            reset_after: quota.reset_after,
        });
    }

    let authority = route.authority();
    let url = route.backend_url(path, uri.query());
    let (parts, body) = req.into_parts();
    let headers = forwarded_request_headers(&parts.headers, &authority, client_ip);

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(client = %client, error = %e, "Failed to read request body");
            timer.record(500);
            return Err(ProxyError::Internal(format!(
                "Failed to read request body: {}",
                e
            )));
        }
    };

    debug!(backend = %url, "Forwarding request to backend");

    let backend_request = BackendRequest {
        method: method.clone(),
        url,
        headers,
        body,
    };

    let mut response = match state.transport.send(backend_request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                backend = %authority,
                path = %path,
                error = %e,
                "Backend request failed"
            );
            metrics::record_backend_error(&authority);
            timer.record(502);
            return Err(ProxyError::Backend(e));
        }
    };

    insert_rate_limit_headers(response.headers_mut(), &quota);

    let status = response.status().as_u16();
    info!(
        method = %method,
        path = %path,
        client = %client,
        backend = %authority,
        status,
        remaining = quota.remaining,
        latency_ms = timer.elapsed_ms(),
        "Request proxied"
    );
    timer.record(status);

    Ok(response)
}
