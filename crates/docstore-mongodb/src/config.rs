//! Facade configuration: connection target, credentials, timeout and retry policy
//!
//! Values are layered: defaults, then an optional TOML file, then `DOCSTORE_*`
//! environment variables, then whatever the caller sets explicitly.

use docstore_common::{DocStoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default database used when none is configured
pub const DEFAULT_DATABASE: &str = "docstore";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DOCSTORE_";

/// Retry configuration for connection establishment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryConfig {
    /// Creates a retry config with no retries (immediate failure).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Creates an exponential backoff policy doubling from `initial_delay_ms`.
    pub fn exponential(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay_ms = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);

        Duration::from_millis((delay_ms as u64).min(self.max_delay_ms))
    }
}

/// Username/password pair plus the database that holds the user.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Authentication database (driver default is `admin`)
    #[serde(default)]
    pub source: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("source", &self.source)
            .finish()
    }
}

/// Options recognized by [`ConnectionHandle::connect`](crate::ConnectionHandle::connect)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// Full connection string; takes precedence over `host`/`port` when set
    pub uri: Option<String>,
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// Optional credentials
    pub credentials: Option<Credentials>,
    /// Connect and server-selection timeout in milliseconds
    pub timeout_ms: u64,
    /// Database the handle operates on
    pub database: String,
    /// Application name reported in server logs
    pub app_name: Option<String>,
    /// Reconnect policy applied to connection failures during connect
    pub retry: RetryConfig,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            uri: None,
            host: "localhost".to_string(),
            port: 27017,
            credentials: None,
            timeout_ms: 5_000,
            database: DEFAULT_DATABASE.to_string(),
            app_name: Some("docstore".to_string()),
            retry: RetryConfig::default(),
        }
    }
}

impl FacadeConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from a connection string
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Load a config from a TOML file; missing keys fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DocStoreError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DocStoreError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `DOCSTORE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `DOCSTORE_*` environment variables onto this config
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables resolved through `lookup` (keys include the prefix)
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(uri) = var("URI") {
            self.uri = Some(uri);
        }
        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = port
                .parse()
                .map_err(|_| DocStoreError::Config(format!("Invalid {}PORT: '{}'", ENV_PREFIX, port)))?;
        }
        if let Some(timeout) = var("TIMEOUT_MS") {
            self.timeout_ms = timeout.parse().map_err(|_| {
                DocStoreError::Config(format!("Invalid {}TIMEOUT_MS: '{}'", ENV_PREFIX, timeout))
            })?;
        }
        if let Some(database) = var("DATABASE") {
            self.database = database;
        }
        if let (Some(username), Some(password)) = (var("USERNAME"), var("PASSWORD")) {
            self.credentials = Some(Credentials {
                username,
                password,
                source: var("AUTH_SOURCE"),
            });
        }

        self.validate()
    }

    /// Set the host and port
    pub fn host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the credentials
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the connect timeout in milliseconds
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the database name
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Connect timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check values that would otherwise only fail at connect time
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(DocStoreError::Config("timeout_ms must be greater than zero".to_string()));
        }
        if self.uri.is_none() && self.host.is_empty() {
            return Err(DocStoreError::Config("Either uri or host must be set".to_string()));
        }
        if let Some(uri) = &self.uri {
            if !uri.starts_with("mongodb://") && !uri.starts_with("mongodb+srv://") {
                return Err(DocStoreError::Config(format!(
                    "Connection string must start with mongodb:// or mongodb+srv://: '{}'",
                    uri
                )));
            }
        }
        if self.database.is_empty() {
            return Err(DocStoreError::Config("database cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = FacadeConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 27017);
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.database, "docstore");
        assert_eq!(config.retry.max_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = FacadeConfig::new()
            .host("db.internal", 27018)
            .timeout_ms(250)
            .database("people_db")
            .credentials(Credentials::new("ada", "secret").with_source("admin"));

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 27018);
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.credentials.unwrap().source.as_deref(), Some("admin"));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = FacadeConfig::from_toml_str(
            r#"
            host = "mongo"
            timeout_ms = 1500

            [credentials]
            username = "app"
            password = "pw"

            [retry]
            max_retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "mongo");
        assert_eq!(config.port, 27017);
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.credentials.as_ref().unwrap().username, "app");
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_from_toml_rejects_zero_timeout() {
        let result = FacadeConfig::from_toml_str("timeout_ms = 0");
        assert!(matches!(result, Err(DocStoreError::Config(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DOCSTORE_HOST", "envhost"),
            ("DOCSTORE_PORT", "28000"),
            ("DOCSTORE_USERNAME", "u"),
            ("DOCSTORE_PASSWORD", "p"),
            ("DOCSTORE_DATABASE", "envdb"),
        ]
        .into_iter()
        .collect();

        let mut config = FacadeConfig::default();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.host, "envhost");
        assert_eq!(config.port, 28000);
        assert_eq!(config.database, "envdb");
        let creds = config.credentials.unwrap();
        assert_eq!(creds.username, "u");
        assert!(creds.source.is_none());
    }

    #[test]
    fn test_apply_env_invalid_port() {
        let mut config = FacadeConfig::default();
        let result = config.apply_env_from(|key| (key == "DOCSTORE_PORT").then(|| "abc".to_string()));
        assert!(matches!(result, Err(DocStoreError::Config(_))));
    }

    #[test]
    fn test_invalid_uri_scheme() {
        let config = FacadeConfig::from_uri("http://localhost:27017");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("ada", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ada"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_retry_no_retry_default() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 0);
        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_retry_exponential_backoff() {
        let retry = RetryConfig::exponential(5, 100, 1_000);
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_millis(1_000));
    }
}
