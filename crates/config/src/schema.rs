use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment variables overriding the configuration file,
/// e.g. `CHATVAULT_OAUTH__CLIENT_SECRET`.
pub const ENV_PREFIX: &str = "CHATVAULT_";

/// Keys whose environment values are taken verbatim instead of being parsed
/// as numbers, booleans or arrays.
const RAW_STRING_KEYS: &[&str] = &["oauth.client_id", "oauth.client_secret"];

fn default_token_url() -> String {
    "https://slack.com/api/oauth.v2.access".to_string()
}

/// OAuth application credentials and the authorization server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Token endpoint used for both code exchange and refresh.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
        }
    }
}

/// Durable credential store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `SQLite` database path (defaults to `~/.chatvault/credentials.db`).
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl StoreConfig {
    /// The configured database path, or the per-user default.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".chatvault").join("credentials.db")
        })
    }
}

/// Which ephemeral cache backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local; markers are not shared between instances.
    #[default]
    Memory,
    Redis,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_key_prefix() -> String {
    "chatvault:".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Prefix applied to every Redis key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    600
}
fn default_refresh_interval_secs() -> u64 {
    12 * 60 * 60
}
fn default_debounce_window_secs() -> u64 {
    60
}
fn default_debounce_wait_millis() -> u64 {
    1_500
}
fn default_refresh_timeout_secs() -> u64 {
    10
}

/// Tunables of the token lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Cache TTL for records without a cache hint, and after a refresh.
    #[serde(default = "default_cache_ttl_secs")]
    pub default_cache_ttl_secs: u64,
    /// Lifetime of the upstream rotating credential; the default refresh
    /// buffer is one third of it.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// How long the debounce marker stays raised after a refresh.
    #[serde(default = "default_debounce_window_secs")]
    pub debounce_window_secs: u64,
    /// Single pause taken by callers that find the marker raised.
    #[serde(default = "default_debounce_wait_millis")]
    pub debounce_wait_millis: u64,
    /// Upper bound on one refresh call to the authorization server.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_cache_ttl_secs: default_cache_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            debounce_window_secs: default_debounce_window_secs(),
            debounce_wait_millis: default_debounce_wait_millis(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `chatvault_auth=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from defaults, an optional YAML file, then
    /// `CHATVAULT_`-prefixed environment variables (`__` separates sections).
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed, or an
    /// environment override has the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .ignore(RAW_STRING_KEYS),
        );
        // Ids like `1234567890.1234567890` would otherwise be parsed as floats.
        let raw = Env::prefixed(ENV_PREFIX)
            .split("__")
            .only(RAW_STRING_KEYS);
        for (key, value) in raw.iter() {
            figment = figment.merge(Serialized::default(key.as_str(), value));
        }
        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const SAMPLE_YAML: &str = r#"
oauth:
  client_id: "1234.5678"
  client_secret: "shh"
cache:
  backend: redis
  redis_url: "redis://cache:6379"
lifecycle:
  debounce_window_secs: 30
log:
  format: json
"#;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.oauth.token_url, "https://slack.com/api/oauth.v2.access");
        assert_eq!(c.cache.backend, CacheBackend::Memory);
        assert_eq!(c.lifecycle.default_cache_ttl_secs, 600);
        assert_eq!(c.lifecycle.refresh_interval_secs, 43_200);
        assert_eq!(c.lifecycle.debounce_window_secs, 60);
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn test_from_yaml_sections() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.oauth.client_id.as_deref(), Some("1234.5678"));
        assert_eq!(c.cache.backend, CacheBackend::Redis);
        assert_eq!(c.cache.redis_url, "redis://cache:6379");
        assert_eq!(c.lifecycle.debounce_window_secs, 30);
        assert_eq!(c.log.format, LogFormat::Json);
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = Config::from_yaml("lifecycle:\n  refresh_timeout_secs: 3").unwrap();
        assert_eq!(c.lifecycle.refresh_timeout_secs, 3);
        assert_eq!(c.lifecycle.debounce_wait_millis, 1_500); // default preserved
        assert_eq!(c.cache.key_prefix, "chatvault:");
    }

    #[test]
    fn test_from_yaml_rejects_unknown_backend() {
        assert!(Config::from_yaml("cache:\n  backend: memcached").is_err());
    }

    #[test]
    fn test_database_path_override() {
        let store = StoreConfig {
            database: Some(PathBuf::from("/tmp/creds.db")),
        };
        assert_eq!(store.database_path(), PathBuf::from("/tmp/creds.db"));
        assert!(
            StoreConfig::default()
                .database_path()
                .ends_with(".chatvault/credentials.db")
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_YAML.as_bytes()).unwrap();
        let c = Config::load(Some(file.path())).unwrap();
        assert_eq!(c.oauth.client_secret.as_deref(), Some("shh"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load(Some(Path::new("/nonexistent/chatvault.yaml"))).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("chatvault.yaml", SAMPLE_YAML)?;
            jail.set_env("CHATVAULT_OAUTH__CLIENT_SECRET", "from-env");
            jail.set_env("CHATVAULT_LIFECYCLE__DEBOUNCE_WAIT_MILLIS", "250");
            let c = Config::load(Some(Path::new("chatvault.yaml")))?;
            assert_eq!(c.oauth.client_secret.as_deref(), Some("from-env"));
            assert_eq!(c.oauth.client_id.as_deref(), Some("1234.5678"));
            assert_eq!(c.lifecycle.debounce_wait_millis, 250);
            Ok(())
        });
    }

    #[test]
    fn test_env_client_credentials_stay_verbatim() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CHATVAULT_OAUTH__CLIENT_ID", "1234567890.1234567890");
            jail.set_env("CHATVAULT_OAUTH__CLIENT_SECRET", "0042");
            let c = Config::load(None)?;
            assert_eq!(c.oauth.client_id.as_deref(), Some("1234567890.1234567890"));
            assert_eq!(c.oauth.client_secret.as_deref(), Some("0042"));
            Ok(())
        });
    }

    #[test]
    fn test_env_client_id_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("chatvault.yaml", SAMPLE_YAML)?;
            jail.set_env("CHATVAULT_OAUTH__CLIENT_ID", "999.111");
            let c = Config::load(Some(Path::new("chatvault.yaml")))?;
            assert_eq!(c.oauth.client_id.as_deref(), Some("999.111"));
            assert_eq!(c.oauth.client_secret.as_deref(), Some("shh"));
            Ok(())
        });
    }
}
