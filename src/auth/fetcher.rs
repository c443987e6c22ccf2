//! Remote key set fetching and the background refresh task.
//!
//! A refresh cycle is two requests:
//!
//! 1. `GET` the issuer's discovery document and read `jwks_uri`.
//! 2. `GET` `jwks_uri`, parse the key array, and read `max-age` from the
//!    response's `Cache-Control` header.
//!
//! The advertised `max-age` becomes the delay before the next cycle, clamped
//! to [`RefreshPolicy::min_refresh`]..=[`RefreshPolicy::max_refresh`]. A
//! failed cycle keeps the current keys and retries after
//! [`RefreshPolicy::retry_delay`].

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{KeyCache, SigningKeySet};
use crate::config::AuthConfig;

/// Error variants for a failed refresh cycle.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network or TLS failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// Discovery document lacks a usable `jwks_uri`.
    #[error("invalid discovery document: {0}")]
    Discovery(String),

    /// Body is not the expected JSON.
    #[error("cannot parse response body: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timing rules for the refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Used when the key set response has no parseable `max-age`.
    pub default_max_age: Duration,
    /// Lower clamp on the advertised `max-age`.
    pub min_refresh: Duration,
    /// Upper clamp on the advertised `max-age`.
    pub max_refresh: Duration,
    /// Delay after a failed cycle.
    pub retry_delay: Duration,
}

impl RefreshPolicy {
    /// Build from the `auth` configuration section.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            default_max_age: config.default_max_age,
            min_refresh: config.min_refresh,
            max_refresh: config.max_refresh,
            retry_delay: config.retry_delay,
        }
    }

    /// Delay until the next cycle for an advertised `max-age` in seconds.
    #[must_use]
    pub fn delay_for(&self, max_age: Option<u64>) -> Duration {
        max_age
            .map_or(self.default_max_age, Duration::from_secs)
            .clamp(self.min_refresh, self.max_refresh)
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

/// Extract `max-age` (seconds) from a `Cache-Control` value.
///
/// `public, max-age=24497, must-revalidate, no-transform` yields `24497`.
/// The directive may appear anywhere in the list; its name is matched
/// case-insensitively.
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value.trim().trim_matches('"').parse::<u64>().ok()
    })
}

/// The partial OpenID discovery document this crate needs.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    jwks_uri: Option<String>,
}

/// Result of one successful fetch.
#[derive(Debug)]
pub struct FetchedKeys {
    /// The new key set, stamped with its expiry.
    pub keys: SigningKeySet,
    /// `max-age` as advertised by the key set response, before clamping.
    pub max_age: Option<u64>,
    /// Delay before the next cycle.
    pub next_refresh: Duration,
}

/// Fetches the issuer's key set via its discovery document.
#[derive(Debug, Clone)]
pub struct KeyFetcher {
    http: reqwest::Client,
    discovery_url: String,
    policy: RefreshPolicy,
}

impl KeyFetcher {
    /// Build from configuration.
    ///
    /// When the discovery URL is HTTPS, the client refuses plain HTTP for
    /// every request, including the `jwks_uri` the document points to.
    pub fn from_config(config: &AuthConfig) -> crate::Result<Self> {
        let https = Url::parse(&config.discovery_url)
            .map_err(|e| crate::Error::Config(format!("Invalid auth.discovery_url: {e}")))?
            .scheme()
            == "https";

        let http = reqwest::Client::builder()
            .https_only(https)
            .timeout(config.fetch_timeout)
            .user_agent(concat!("todo-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(
            http,
            config.discovery_url.clone(),
            RefreshPolicy::from_config(config),
        ))
    }

    /// Build with an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        discovery_url: impl Into<String>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            http,
            discovery_url: discovery_url.into(),
            policy,
        }
    }

    /// The discovery document URL.
    #[must_use]
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Timing rules in effect.
    #[must_use]
    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Step 1: resolve the key set endpoint from the discovery document.
    pub async fn discover(&self) -> Result<Url, FetchError> {
        let response = self.http.get(&self.discovery_url).send().await?;
        let body = checked(response).await?.bytes().await?;
        let doc: DiscoveryDocument = serde_json::from_slice(&body)?;

        let jwks_uri = doc
            .jwks_uri
            .ok_or_else(|| FetchError::Discovery("missing jwks_uri".to_string()))?;
        Url::parse(&jwks_uri).map_err(|e| FetchError::Discovery(format!("jwks_uri {jwks_uri:?}: {e}")))
    }

    /// Run both steps and build a new key set.
    pub async fn fetch(&self) -> Result<FetchedKeys, FetchError> {
        let jwks_uri = self.discover().await?;
        debug!(jwks_uri = %jwks_uri, "Fetching signing keys");

        let response = checked(self.http.get(jwks_uri).send().await?).await?;
        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age);
        let body = response.bytes().await?;
        let jwks: JwkSet = serde_json::from_slice(&body)?;

        let next_refresh = self.policy.delay_for(max_age);
        Ok(FetchedKeys {
            keys: SigningKeySet::from_jwks(jwks, next_refresh),
            max_age,
            next_refresh,
        })
    }

    /// One refresh cycle: fetch, publish into `cache`, and return the delay
    /// before the next cycle. Failures leave `cache` untouched.
    pub async fn refresh(&self, cache: &KeyCache) -> Duration {
        match self.fetch().await {
            Ok(fetched) => {
                if fetched.max_age.is_none() {
                    warn!(
                        default_secs = self.policy.default_max_age.as_secs(),
                        "Key set response has no max-age, using default refresh delay"
                    );
                }
                info!(
                    keys = fetched.keys.len(),
                    kids = ?fetched.keys.kids().collect::<Vec<_>>(),
                    next_refresh_secs = fetched.next_refresh.as_secs(),
                    "Cached signing keys"
                );
                cache.replace(fetched.keys);
                fetched.next_refresh
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_secs = self.policy.retry_delay.as_secs(),
                    "Signing key refresh failed, keeping current keys"
                );
                self.policy.retry_delay
            }
        }
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

/// Spawn the perpetual refresh loop.
///
/// The first cycle starts immediately; each later cycle starts after the
/// delay returned by the previous one. The task exits when `shutdown` fires
/// or its sender is dropped.
pub fn spawn_refresh(
    cache: Arc<KeyCache>,
    fetcher: Arc<KeyFetcher>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delay = tokio::select! {
                delay = fetcher.refresh(&cache) => delay,
                _ = shutdown.recv() => break,
            };
            cache.schedule_refresh(delay);

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }
        debug!("Key refresh task shutting down");
    })
}
