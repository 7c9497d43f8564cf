//! Declarative client configuration.
//!
//! [`ClientConfig`] is a plain value object: it is deserialized (or built in
//! code), validated once by the factory and never mutated afterwards.

use crate::error::{HttpError, InvalidUriKind};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("stub-http-client/", env!("CARGO_PKG_VERSION"));

/// Base URL of the local stub server targeted by [`ClientConfig::for_testing`].
pub const DEFAULT_STUB_URL: &str = "http://localhost:10001";

/// Environment variable prefix understood by [`load`].
///
/// `STUB_CLIENT__READ_TIMEOUT=500` overrides `readTimeout`.
pub const ENV_PREFIX: &str = "STUB_CLIENT__";

const DEFAULT_NAME: &str = "webClient";
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(3000);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(3000);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(9000);
const DEFAULT_MAX_RETRY: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Connection, timeout and pool parameters for one client.
///
/// Timeouts are written as integer milliseconds; `maxIdleTime` and
/// `retryDelay` take humantime strings such as `"30s"` or `"1m 5s"`.
/// A zero timeout disables the corresponding check.
///
/// ```yaml
/// name: orders
/// url: "https://orders.internal:8443/api"
/// maxConnections: 16
/// connectionTimeout: 1000
/// readTimeout: 2000
/// maxIdleTime: "30s"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Identifier used to name the connection pool and tag log records.
    pub name: String,

    /// Absolute base URL every request path is resolved against.
    pub url: String,

    /// Cap on simultaneously checked-out connections. `None` means no cap.
    pub max_connections: Option<usize>,

    /// TCP connect timeout.
    #[serde(with = "millis")]
    pub connection_timeout: Duration,

    /// Longest a connection may wait for inbound bytes while a read is pending.
    #[serde(with = "millis")]
    pub read_timeout: Duration,

    /// Longest a connection may wait to flush outbound bytes.
    #[serde(with = "millis")]
    pub write_timeout: Duration,

    /// Idle pooled connections are evicted after this long. `None` keeps them.
    #[serde(with = "humantime_serde::option")]
    pub max_idle_time: Option<Duration>,

    /// Carried for configuration compatibility; call paths never retry.
    pub max_retry: u32,

    /// Carried for configuration compatibility; call paths never retry.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Accept any server certificate.
    ///
    /// **WARNING**: only for stub servers with self-signed certificates.
    /// Never enable this against production endpoints.
    pub danger_accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            url: String::new(),
            max_connections: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_idle_time: None,
            max_retry: DEFAULT_MAX_RETRY,
            retry_delay: DEFAULT_RETRY_DELAY,
            danger_accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    /// Create a config with default limits for the given base URL.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Configuration used by [`TestClient`](crate::TestClient): the local stub
    /// server, no retries and certificate verification disabled.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            name: "test".to_owned(),
            url: DEFAULT_STUB_URL.to_owned(),
            max_retry: 0,
            danger_accept_invalid_certs: true,
            ..Default::default()
        }
    }

    /// Name of the connection pool backing clients built from this config.
    #[must_use]
    pub fn pool_name(&self) -> String {
        format!("{}-provider", self.name)
    }

    /// Check invariants and return the parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL is missing, malformed, not
    /// absolute or not `http`/`https`, or if `maxConnections` is zero.
    pub fn validate(&self) -> Result<Url, HttpError> {
        if self.url.trim().is_empty() {
            return Err(HttpError::InvalidConfig {
                field: "url",
                reason: "base URL is required".to_owned(),
            });
        }

        if self.max_connections == Some(0) {
            return Err(HttpError::InvalidConfig {
                field: "maxConnections",
                reason: "must be at least 1 when set".to_owned(),
            });
        }

        let url = Url::parse(&self.url).map_err(|e| HttpError::InvalidUri {
            url: self.url.clone(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(HttpError::InvalidScheme {
                    scheme: other.to_owned(),
                });
            }
        }

        if url.cannot_be_a_base() {
            return Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::NotABase,
                reason: "URL cannot be used as a base".to_owned(),
            });
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        Ok(url)
    }
}

/// Load a [`ClientConfig`] by layering, lowest precedence first:
/// `defaults` → YAML file (if given) → `STUB_CLIENT__*` environment variables.
///
/// Environment keys are upper snake case (`STUB_CLIENT__MAX_CONNECTIONS`) and
/// map onto the config fields (`MAX_IDLE_TIME` -> `maxIdleTime`).
///
/// # Errors
///
/// Returns `HttpError::InvalidConfig` if the file does not exist, a layer
/// cannot be read or a value has the wrong shape, and any error from
/// [`ClientConfig::validate`].
pub fn load(path: Option<&Path>, defaults: ClientConfig) -> Result<ClientConfig, HttpError> {
    let mut figment = Figment::new().merge(Serialized::defaults(defaults));
    if let Some(path) = path {
        if !path.is_file() {
            return Err(HttpError::InvalidConfig {
                field: "config",
                reason: format!("config file does not exist: {}", path.display()),
            });
        }
        figment = figment.merge(Yaml::file(path));
    }
    figment = figment
        .merge(Env::prefixed(ENV_PREFIX).map(|key| env_key_to_field(key.as_str()).into()));

    let config: ClientConfig = figment.extract().map_err(|e| HttpError::InvalidConfig {
        field: "config",
        reason: e.to_string(),
    })?;
    config.validate()?;

    tracing::debug!(name = %config.name, url = %config.url, "client configuration loaded");
    Ok(config)
}

/// `max_idle_time` -> `maxIdleTime`
fn env_key_to_field(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

/// Durations as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.name, "webClient");
        assert_eq!(config.url, "");
        assert_eq!(config.max_connections, None);
        assert_eq!(config.connection_timeout, Duration::from_millis(3000));
        assert_eq!(config.read_timeout, Duration::from_millis(3000));
        assert_eq!(config.write_timeout, Duration::from_millis(9000));
        assert_eq!(config.max_idle_time, None);
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert!(!config.danger_accept_invalid_certs);
    }

    #[test]
    fn test_for_testing_preset() {
        let config = ClientConfig::for_testing();
        assert_eq!(config.name, "test");
        assert_eq!(config.url, "http://localhost:10001");
        assert_eq!(config.max_retry, 0);
        assert!(config.danger_accept_invalid_certs);
        assert_eq!(config.pool_name(), "test-provider");
    }

    #[test]
    fn test_validate_accepts_absolute_urls() {
        let url = ClientConfig::new("svc", "http://localhost:10001")
            .validate()
            .unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(10001));

        let url = ClientConfig::new("svc", "https://example.com/api/v1")
            .validate()
            .unwrap();
        assert_eq!(url.path(), "/api/v1");
    }

    #[test]
    fn test_validate_rejects_missing_url() {
        let err = ClientConfig::default().validate().unwrap_err();
        assert!(matches!(err, HttpError::InvalidConfig { field: "url", .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_relative_url() {
        let err = ClientConfig::new("svc", "/just/a/path").validate().unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::ParseError,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_unsupported_scheme() {
        let err = ClientConfig::new("svc", "ftp://files.example.com")
            .validate()
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { ref scheme } if scheme == "ftp"));
    }

    #[test]
    fn test_validate_rejects_zero_max_connections() {
        let config = ClientConfig {
            max_connections: Some(0),
            ..ClientConfig::new("svc", "http://localhost:1")
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidConfig {
                field: "maxConnections",
                ..
            }
        ));
    }

    #[test]
    fn test_config_parse_from_yaml() {
        let yaml = r#"
name: "orders"
url: "https://orders.internal:8443"
maxConnections: 16
connectionTimeout: 1000
readTimeout: 2500
writeTimeout: 4000
maxIdleTime: "30s"
maxRetry: 0
retryDelay: "250ms"
dangerAcceptInvalidCerts: true
"#;
        let config: ClientConfig = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.name, "orders");
        assert_eq!(config.url, "https://orders.internal:8443");
        assert_eq!(config.max_connections, Some(16));
        assert_eq!(config.connection_timeout, Duration::from_millis(1000));
        assert_eq!(config.read_timeout, Duration::from_millis(2500));
        assert_eq!(config.write_timeout, Duration::from_millis(4000));
        assert_eq!(config.max_idle_time, Some(Duration::from_secs(30)));
        assert_eq!(config.max_retry, 0);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert!(config.danger_accept_invalid_certs);
    }

    #[test]
    fn test_config_applies_defaults() {
        let yaml = r#"
url: "http://localhost:8080"
"#;
        let config: ClientConfig = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.url, "http://localhost:8080");
        assert_eq!(config.name, "webClient");
        assert_eq!(config.write_timeout, Duration::from_millis(9000));
        assert_eq!(config.max_idle_time, None);
    }

    #[test]
    fn test_config_reject_unknown_fields() {
        let yaml = r#"
url: "http://localhost:8080"
keepAlive: true
"#;
        let result: Result<ClientConfig, _> = serde_saphyr::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_reject_bad_duration() {
        let yaml = r#"
url: "http://localhost:8080"
maxIdleTime: "soon"
"#;
        let result: Result<ClientConfig, _> = serde_saphyr::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_json_shape() {
        let config = ClientConfig {
            max_idle_time: Some(Duration::from_secs(90)),
            ..ClientConfig::for_testing()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["connectionTimeout"], 3000);
        assert_eq!(value["maxIdleTime"], "1m 30s");
        assert_eq!(value["retryDelay"], "1s");
        assert_eq!(value["dangerAcceptInvalidCerts"], true);

        let back: ClientConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_env_key_to_field() {
        assert_eq!(env_key_to_field("url"), "url");
        assert_eq!(env_key_to_field("max_idle_time"), "maxIdleTime");
        assert_eq!(env_key_to_field("DANGER_ACCEPT_INVALID_CERTS"), "dangerAcceptInvalidCerts");
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "client.yaml",
                r#"
name: "inventory"
url: "http://localhost:9000"
readTimeout: 1500
"#,
            )?;
            jail.set_env("STUB_CLIENT__READ_TIMEOUT", "500");
            jail.set_env("STUB_CLIENT__MAX_CONNECTIONS", "4");

            let config = load(Some(Path::new("client.yaml")), ClientConfig::default())
                .map_err(|e| e.to_string())?;
            assert_eq!(config.name, "inventory");
            assert_eq!(config.url, "http://localhost:9000");
            assert_eq!(config.read_timeout, Duration::from_millis(500));
            assert_eq!(config.max_connections, Some(4));
            assert_eq!(config.write_timeout, Duration::from_millis(9000));
            Ok(())
        });
    }

    #[test]
    fn test_load_uses_defaults_without_file() {
        figment::Jail::expect_with(|_jail| {
            let config =
                load(None, ClientConfig::for_testing()).map_err(|e| e.to_string())?;
            assert_eq!(config, ClientConfig::for_testing());
            Ok(())
        });
    }

    #[test]
    fn test_load_validates_result() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STUB_CLIENT__URL", "not a url");
            let err = load(None, ClientConfig::for_testing()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            Ok(())
        });
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        figment::Jail::expect_with(|_jail| {
            let err = load(Some(Path::new("absent.yaml")), ClientConfig::for_testing())
                .unwrap_err();
            assert!(matches!(err, HttpError::InvalidConfig { field: "config", .. }));
            Ok(())
        });
    }
}
