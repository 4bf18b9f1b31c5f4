//! Binary entry point for myadmin.
//!
//! Loads the backend configuration, sets up logging and runs one
//! administrative command against a named instance, printing the result as
//! JSON on stdout.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use commands::{MongoAction, RedisAction, S3Action, SqlAction};
use myadmin::{AdminConfig, Registry, observability};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// myadmin - administration for SQL, Redis, MongoDB and S3 backends.
#[derive(Parser)]
#[command(name = "myadmin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Backend instance name.
    #[arg(short, long, global = true)]
    instance: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Show every configured instance and its state.
    Status {
        /// Construct and ping each instance.
        #[arg(long)]
        ping: bool,
    },

    /// Redis administration.
    Redis {
        /// Redis operation.
        #[command(subcommand)]
        action: RedisAction,
    },

    /// MongoDB administration.
    Mongo {
        /// MongoDB operation.
        #[command(subcommand)]
        action: MongoAction,
    },

    /// S3 bucket and object administration.
    S3 {
        /// S3 operation.
        #[command(subcommand)]
        action: S3Action,
    },

    /// Relational database access.
    Sql {
        /// SQL operation.
        #[command(subcommand)]
        action: SqlAction,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let path = AdminConfig::resolve_path(cli.config.as_deref());
    let config = match AdminConfig::load_from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(cli: Cli, config: AdminConfig) -> anyhow::Result<()> {
    let session = config.session.clone();
    let registry = Arc::new(Registry::new(config.backends));
    let instance = cli.instance.as_deref();

    // Ctrl-C aborts in-flight MongoDB commands.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Status { ping } => commands::cmd_status(&registry, ping, &cancel).await,
        Commands::Redis { action } => {
            commands::cmd_redis(&registry, instance, &session, action).await
        },
        Commands::Mongo { action } => {
            commands::cmd_mongo(&registry, instance, action, &cancel).await
        },
        Commands::S3 { action } => commands::cmd_s3(&registry, instance, action).await,
        Commands::Sql { action } => commands::cmd_sql(&registry, instance, action).await,
    }
}
