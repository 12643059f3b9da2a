//! Configuration loading for chatvault.
//!
//! Uses figment to layer defaults, an optional YAML file, and
//! `CHATVAULT_`-prefixed environment variables.

pub mod schema;

pub use schema::{
    CacheBackend, CacheConfig, Config, ENV_PREFIX, LifecycleConfig, LogConfig, LogFormat,
    OAuthConfig, StoreConfig,
};
