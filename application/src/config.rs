//! [`Config`]-related definitions.

use std::{path::PathBuf, time};

use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use secrecy::SecretString;
use serde::Deserialize;
use service::infra::auth::rest;
use smart_default::SmartDefault;

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: Server,

    /// Session configuration.
    pub session: Session,

    /// Auth provider configuration.
    pub provider: Provider,

    /// Postgres configuration.
    pub postgres: Postgres,

    /// Local storage configuration.
    pub storage: Storage,

    /// Log configuration.
    pub log: Log,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Server {
    /// Host to bind the server to.
    #[default("127.0.0.1".to_owned())]
    pub host: String,

    /// Port to bind the server to.
    #[default(8080)]
    pub port: u16,

    /// [CORS] configuration.
    ///
    /// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
    pub cors: Cors,
}

/// [CORS] configuration.
///
/// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cors {
    /// List of allowed origins.
    #[default(vec!["*".to_owned()])]
    pub origins: Vec<String>,
}

/// Session configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Session {
    /// Maximum time to wait for the live session check.
    #[default(time::Duration::from_secs(2))]
    #[serde(with = "humantime_serde")]
    pub check_timeout: time::Duration,

    /// Maximum time to wait for a profile lookup.
    #[default(time::Duration::from_secs(5))]
    #[serde(with = "humantime_serde")]
    pub profile_lookup_timeout: time::Duration,

    /// Age under which a persisted session is reused without any checks.
    #[default(time::Duration::from_secs(2 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub fresh_age: time::Duration,

    /// Age under which a persisted session is reused instead of fetching the
    /// profile.
    #[default(time::Duration::from_secs(6 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub stale_age: time::Duration,

    /// Initial delay before retrying a failed session resolution.
    #[default(time::Duration::from_millis(500))]
    #[serde(with = "humantime_serde")]
    pub retry_backoff: time::Duration,

    /// Maximum delay before retrying a failed session resolution.
    #[default(time::Duration::from_secs(5))]
    #[serde(with = "humantime_serde")]
    pub retry_backoff_cap: time::Duration,
}

impl From<Session> for service::Config {
    fn from(value: Session) -> Self {
        let Session {
            check_timeout,
            profile_lookup_timeout,
            fresh_age,
            stale_age,
            retry_backoff,
            retry_backoff_cap,
        } = value;
        Self {
            session_check_timeout: check_timeout,
            profile_lookup_timeout,
            fresh_snapshot_age: fresh_age,
            stale_snapshot_age: stale_age,
            retry_backoff,
            retry_backoff_cap,
        }
    }
}

/// Auth provider configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Provider {
    /// Base URL of the hosted backend.
    #[default("http://127.0.0.1:54321".to_owned())]
    pub url: String,

    /// Public API key of the hosted backend.
    #[default(SecretString::from(String::new()))]
    pub api_key: SecretString,

    /// Timeout of a single request to the auth provider.
    #[default(time::Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub request_timeout: time::Duration,
}

impl TryFrom<Provider> for rest::Config {
    type Error = url::ParseError;

    fn try_from(value: Provider) -> Result<Self, Self::Error> {
        let Provider {
            url,
            api_key,
            request_timeout,
        } = value;
        Ok(Self {
            url: url.parse()?,
            api_key,
            request_timeout,
        })
    }
}

/// Postgres configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Postgres {
    /// Host to connect to.
    #[default("127.0.0.1".to_owned())]
    pub host: String,

    /// Port to connect to.
    #[default(5432)]
    pub port: u16,

    /// User to connect as.
    #[default("postgres".to_owned())]
    pub user: String,

    /// Password to connect with.
    #[default("postgres".to_owned())]
    pub password: String,

    /// Database name to connect to.
    #[default("postgres".to_owned())]
    pub dbname: String,
}

impl From<Postgres> for service::infra::postgres::Config {
    fn from(value: Postgres) -> Self {
        let Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } = value;

        Self {
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            dbname: Some(dbname),
            ..Self::default()
        }
    }
}

/// Local storage configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Storage {
    /// Directory to persist the session in.
    #[default(PathBuf::from(".pos-session"))]
    pub dir: PathBuf,
}

/// Log configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace,

    /// Designates lower priority information.
    Debug,

    /// Designates useful information.
    #[default]
    Info,

    /// Designates hazardous situations.
    Warn,

    /// Designates very serious errors.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use super::{Config, Session};

    #[test]
    fn session_defaults_match_service_defaults() {
        let config: service::Config = Session::default().into();
        let expected = service::Config::default();

        assert_eq!(config.session_check_timeout, expected.session_check_timeout);
        assert_eq!(config.fresh_snapshot_age, expected.fresh_snapshot_age);
        assert_eq!(config.stale_snapshot_age, expected.stale_snapshot_age);
        assert_eq!(config.retry_backoff_cap, expected.retry_backoff_cap);
    }

    #[test]
    fn loads_defaults_without_file() {
        let config = Config::new("non-existent.toml").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.check_timeout, Duration::from_secs(2));
        assert_eq!(config.storage.dir.to_str(), Some(".pos-session"));
    }
}
