use crate::rate_limit::RateLimitResult;
use http::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use std::net::IpAddr;

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy `source` without hop-by-hop headers
pub fn end_to_end_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Headers for the outbound request.
///
/// The client's `Host` moves to `X-Forwarded-Host`, `Host` becomes the
/// backend authority and the client address is appended to `X-Forwarded-For`.
pub fn forwarded_request_headers(
    source: &HeaderMap,
    backend_authority: &str,
    client_ip: IpAddr,
) -> HeaderMap {
    let mut headers = end_to_end_headers(source);

    if let Some(original_host) = headers.remove(HOST) {
        headers.insert(X_FORWARDED_HOST, original_host);
    }
    if let Ok(authority) = HeaderValue::from_str(backend_authority) {
        headers.insert(HOST, authority);
    }

    let client = client_ip.to_canonical().to_string();
    let forwarded_for = match headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) if !prior.is_empty() => format!("{}, {}", prior, client),
        _ => client,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    headers
}

/// Add `X-RateLimit-*` headers describing the client's quota
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_after));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop_header("Connection"));
        assert!(is_hop_by_hop_header("connection"));
        assert!(is_hop_by_hop_header("Keep-Alive"));
        assert!(is_hop_by_hop_header("Transfer-Encoding"));
        assert!(!is_hop_by_hop_header("Content-Type"));
        assert!(!is_hop_by_hop_header("Authorization"));
    }

    #[test]
    fn test_forwarded_request_headers() {
        let mut source = HeaderMap::new();
        source.insert(HOST, HeaderValue::from_static("proxy.example.com"));
        source.insert("connection", HeaderValue::from_static("keep-alive"));
        source.insert("accept", HeaderValue::from_static("application/json"));

        let headers =
            forwarded_request_headers(&source, "localhost:3000", "10.1.2.3".parse().unwrap());

        assert_eq!(headers.get(HOST).unwrap(), "localhost:3000");
        assert_eq!(headers.get(X_FORWARDED_HOST).unwrap(), "proxy.example.com");
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.1.2.3");
        assert_eq!(headers.get("accept").unwrap(), "application/json");
        assert!(headers.get("connection").is_none());
    }

    #[test]
    fn test_forwarded_for_is_appended() {
        let mut source = HeaderMap::new();
        source.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));

        let headers =
            forwarded_request_headers(&source, "localhost:3000", "10.1.2.3".parse().unwrap());

        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "203.0.113.9, 10.1.2.3");
        assert!(headers.get(X_FORWARDED_HOST).is_none());
    }

    #[test]
    fn test_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        insert_rate_limit_headers(&mut headers, &RateLimitResult::allowed(7, 20, 42));

        assert_eq!(headers.get(X_RATELIMIT_LIMIT).unwrap(), "20");
        assert_eq!(headers.get(X_RATELIMIT_REMAINING).unwrap(), "7");
        assert_eq!(headers.get(X_RATELIMIT_RESET).unwrap(), "42");
    }
}
