//! Rate limiting module
//!
//! Fixed-window, per-client quotas kept in a shared store:
//!
//! - [`RedisStore`]: production store, shared by every proxy instance
//! - [`MemoryStore`]: single-process store, also used by the tests
//!
//! The limiter itself is stateless. Each consume is a create-if-absent
//! followed, when the bucket already exists, by a decrement-if-positive;
//! both are single atomic store operations.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tinyrp::rate_limit::{ClientId, MemoryStore, RateLimitConfig, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), RateLimitConfig::new(20, 60));
//!     let client = ClientId::from_ip("192.168.1.1".parse().unwrap());
//!
//!     let result = limiter.consume(&client).await.unwrap();
//!     assert!(result.allowed);
//!     assert_eq!(result.remaining, 19);
//! }
//! ```

pub mod limiter;
pub mod lua_scripts;
pub mod memory;
pub mod redis;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use limiter::RateLimiter;
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use store::{Decrement, SharedStore, StoreError};
pub use types::{ClientId, RateLimitConfig, RateLimitResult};
