//! Todo API - task list backend behind Google ID token authentication.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use todo_api::{
    auth::KeyFetcher,
    cli::{Cli, Command},
    config::Config,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            cli.apply(&mut config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Keys) => run_keys(&config).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Fetch the signing keys once and print them
async fn run_keys(config: &Config) -> ExitCode {
    let fetcher = match KeyFetcher::from_config(&config.auth) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to create key fetcher: {e}");
            return ExitCode::FAILURE;
        }
    };

    match fetcher.fetch().await {
        Ok(fetched) => {
            println!("Discovery: {}", fetcher.discovery_url());
            println!("Keys ({}):", fetched.keys.len());
            for kid in fetched.keys.kids() {
                println!("  {kid}");
            }
            match fetched.max_age {
                Some(secs) => println!("max-age: {secs}s"),
                None => println!("max-age: (not advertised)"),
            }
            println!("Next refresh in {}s", fetched.next_refresh.as_secs());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Key fetch failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        storage = %config.storage.url,
        "Starting Todo API"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}
