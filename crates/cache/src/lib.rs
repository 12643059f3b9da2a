//! Ephemeral cache backends for credential projections and refresh markers.
//!
//! Provides an in-process cache for single-instance deployments and tests, and
//! a Redis-backed cache shared across instances.

pub mod memory;
pub mod redis;

pub use memory::InMemoryCache;
pub use redis::RedisCache;
