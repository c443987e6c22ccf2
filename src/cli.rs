//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Task list backend behind Google ID token authentication
#[derive(Parser, Debug)]
#[command(name = "todo-api")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TODO_API_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TODO_API_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "TODO_API_HOST")]
    pub host: Option<String>,

    /// Directory of static client files
    #[arg(long, env = "TODO_API_WEBROOT")]
    pub webroot: Option<PathBuf>,

    /// File holding the OAuth client ID
    #[arg(long, env = "TODO_API_CLIENT_ID_FILE", global = true)]
    pub client_id_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "TODO_API_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "TODO_API_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default)
    Serve,

    /// Fetch the issuer's signing keys once and print them
    Keys,
}

impl Cli {
    /// Apply command-line overrides on top of file/env configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref host) = self.host {
            config.server.host.clone_from(host);
        }
        if let Some(ref webroot) = self.webroot {
            config.server.webroot.clone_from(webroot);
        }
        if let Some(ref file) = self.client_id_file {
            config.auth.client_id_file.clone_from(file);
        }
    }
}
