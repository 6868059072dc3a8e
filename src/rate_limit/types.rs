use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Requests allowed per client per window when the config does not say otherwise
pub const DEFAULT_CAPACITY: u32 = 20;
/// Window length in seconds when the config does not say otherwise
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Fixed-window quota policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of requests per window
    pub capacity: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Prefix for counter keys in the shared store
    pub key_prefix: String,
}

impl RateLimitConfig {
    pub fn new(capacity: u32, window_secs: u64) -> Self {
        Self {
            capacity,
            window_secs,
            key_prefix: "tinyrp:ratelimit:".to_string(),
        }
    }

    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Store key holding the counter for `client`
    pub fn key_for(&self, client: &ClientId) -> String {
        format!("{}{}", self.key_prefix, client)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW_SECS)
    }
}

/// Identity under which quota is tracked: the client's address without port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// IPv4-mapped IPv6 addresses collapse to their IPv4 form.
    pub fn from_ip(ip: IpAddr) -> Self {
        Self(ip.to_canonical().to_string())
    }

    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        Self::from_ip(addr.ip())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rate limit result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Total limit
    pub limit: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
}

impl RateLimitResult {
    /// Create an allowed result
    pub fn allowed(remaining: u32, limit: u32, reset_after: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset_after,
        }
    }

    /// Create a denied result
    pub fn denied(limit: u32, reset_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_after,
        }
    }
}

/// Whole seconds until `ttl` elapses, rounded up
pub(crate) fn ceil_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_strips_port() {
        let a: SocketAddr = "192.168.1.1:50000".parse().unwrap();
        let b: SocketAddr = "192.168.1.1:50001".parse().unwrap();
        assert_eq!(ClientId::from_socket_addr(&a), ClientId::from_socket_addr(&b));
        assert_eq!(ClientId::from_socket_addr(&a).as_str(), "192.168.1.1");
    }

    #[test]
    fn test_client_id_canonicalizes_mapped_ipv6() {
        let mapped: SocketAddr = "[::ffff:10.0.0.7]:443".parse().unwrap();
        assert_eq!(ClientId::from_socket_addr(&mapped).as_str(), "10.0.0.7");

        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(ClientId::from_socket_addr(&v6).as_str(), "2001:db8::1");
    }

    #[test]
    fn test_key_for() {
        let config = RateLimitConfig::default();
        let client = ClientId::from_ip("192.168.1.1".parse().unwrap());
        assert_eq!(config.key_for(&client), "tinyrp:ratelimit:192.168.1.1");
    }

    #[test]
    fn test_rate_limit_config_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.capacity, 20);
        assert_eq!(config.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_rate_limit_result() {
        let allowed = RateLimitResult::allowed(19, 20, 60);
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, 19);

        let denied = RateLimitResult::denied(20, 30);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_after, 30);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(0)), 0);
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(ceil_secs(Duration::from_secs(60)), 60);
    }
}
