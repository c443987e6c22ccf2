//! Todo API Library
//!
//! Task list backend whose `/a` routes are guarded by Google ID tokens.
//!
//! # Features
//!
//! - **Key cache**: Google's signing keys, refreshed in the background on the
//!   schedule advertised by `Cache-Control: max-age`
//! - **Token verification**: signature, issuer, audience and expiry checks
//!   with no network I/O on the request path
//! - **Per-user tasks**: every stored task is scoped to the token's subject
//! - **Static hosting** and a websocket channel for the browser client

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}
