//! Task list HTTP server

pub mod handlers;
pub mod realtime;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub use router::{AppState, PROTECTED_PREFIX, create_router};

use crate::auth::{KeyCache, KeyFetcher, TokenVerifier, spawn_refresh};
use crate::config::Config;
use crate::store;
use crate::{Error, Result};

/// Task list server
pub struct Server {
    /// Configuration
    config: Config,
    /// Handler state
    state: Arc<AppState>,
    /// Signing keys shared by the verifier and the refresh task
    keys: Arc<KeyCache>,
    /// Key set fetcher driven by the refresh task
    fetcher: Arc<KeyFetcher>,
}

impl Server {
    /// Create a new server.
    ///
    /// Fails fast when the client ID file is unreadable or the storage URL
    /// names an unsupported backend.
    pub fn new(config: Config) -> Result<Self> {
        let client_id = config.auth.read_client_id()?;
        let store = store::connect(&config.storage.url)?;

        let keys = Arc::new(KeyCache::new());
        let fetcher = Arc::new(KeyFetcher::from_config(&config.auth)?);
        let verifier = Arc::new(
            TokenVerifier::new(Arc::clone(&keys), client_id).with_leeway(config.auth.leeway),
        );

        Ok(Self {
            config,
            state: Arc::new(AppState { store, verifier }),
            keys,
            fetcher,
        })
    }

    /// The application router, without the background refresh task.
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state), &self.config.server.webroot)
    }

    /// Run the server until ctrl-c / SIGTERM.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        // First refresh runs immediately; requests before it completes get 401
        let refresh = spawn_refresh(
            Arc::clone(&self.keys),
            Arc::clone(&self.fetcher),
            shutdown_tx.subscribe(),
        );

        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("TODO API v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(webroot = %self.config.server.webroot.display(), "Hosting static files");
        info!(discovery = %self.fetcher.discovery_url(), "Signing keys");
        info!(audience = %self.state.verifier.audience(), "Accepting ID tokens");
        info!("  {PROTECTED_PREFIX}/*   (Authorization: Bearer <Google ID token>)");
        info!("  /socket (websocket)");
        info!("============================================================");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        if tokio::time::timeout(self.config.server.shutdown_timeout, refresh)
            .await
            .is_err()
        {
            warn!("Key refresh task did not stop in time");
        }

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
