//! Configuration management

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::auth::GOOGLE_DISCOVERY_URL;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// ID token verification configuration
    pub auth: AuthConfig,
    /// Document store configuration
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory served as static assets at `/`
    pub webroot: PathBuf,
    /// Time allowed for background tasks to stop on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            webroot: PathBuf::from("../client"),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// ID token verification and key refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// File holding the OAuth client ID that tokens must be issued for
    pub client_id_file: PathBuf,
    /// Issuer discovery document URL
    pub discovery_url: String,
    /// Delay before retrying a failed key refresh
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Refresh delay used when the key set response has no usable `max-age`
    #[serde(with = "humantime_serde")]
    pub default_max_age: Duration,
    /// Lower bound applied to the advertised `max-age`
    #[serde(with = "humantime_serde")]
    pub min_refresh: Duration,
    /// Upper bound applied to the advertised `max-age`
    #[serde(with = "humantime_serde")]
    pub max_refresh: Duration,
    /// Clock skew tolerated when checking `exp`
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
    /// Timeout for each discovery / key set request
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id_file: PathBuf::from("client_id"),
            discovery_url: GOOGLE_DISCOVERY_URL.to_string(),
            retry_delay: Duration::from_secs(60),
            default_max_age: Duration::from_secs(3600),
            min_refresh: Duration::from_secs(30),
            max_refresh: Duration::from_secs(24 * 3600),
            leeway: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl AuthConfig {
    /// Read the client ID (token audience) from `client_id_file`.
    ///
    /// Surrounding whitespace is stripped. An empty file is rejected because
    /// every audience check would fail against it.
    pub fn read_client_id(&self) -> Result<String> {
        let raw = std::fs::read_to_string(&self.client_id_file).map_err(|e| {
            Error::Config(format!(
                "Cannot read client ID file {}: {e}",
                self.client_id_file.display()
            ))
        })?;

        let client_id = raw.trim();
        if client_id.is_empty() {
            return Err(Error::Config(format!(
                "Client ID file {} is empty",
                self.client_id_file.display()
            )));
        }
        Ok(client_id.to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.retry_delay.is_zero() {
            return Err(Error::config("auth.retry_delay must be greater than zero"));
        }
        if self.min_refresh.is_zero() || self.min_refresh > self.max_refresh {
            return Err(Error::config(
                "auth.min_refresh must be non-zero and not exceed auth.max_refresh",
            ));
        }
        url::Url::parse(&self.discovery_url)
            .map_err(|e| Error::Config(format!("Invalid auth.discovery_url: {e}")))?;
        Ok(())
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Connection string; only `memory://` is built in
    pub url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or holds values that would leave the key refresh loop unusable.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (TODO_API_ prefix)
        figment = figment.merge(Env::prefixed("TODO_API_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.auth.validate()?;
        Ok(config)
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "2h", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, String> {
        // "ms" must be checked before "s" and "m"
        let (digits, unit_secs) = if let Some(ms) = s.strip_suffix("ms") {
            return number(ms).map(Duration::from_millis);
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else {
            // Assume seconds
            (s, 1)
        };

        number(digits)?
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration out of range: {s}"))
    }

    fn number(digits: &str) -> Result<u64, String> {
        digits
            .parse::<u64>()
            .map_err(|e| format!("invalid duration {digits:?}: {e}"))
    }
}
