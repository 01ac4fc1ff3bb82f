//! listsync - keeps a Webflow CMS collection in step with a listing feed
//!
//! Each invocation fetches the feed, diffs it against the persisted mapping
//! and applies creates, updates and deletes to the collection. The run report
//! is printed to stdout as JSON.
//!
//! Exit codes: 0 done, 2 partial failure (or drift / blocked plan), 1 failed.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod logging;

use config::AppConfig;

/// Listing feed to CMS collection reconciliation
#[derive(Parser)]
#[command(name = "listsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    Run(commands::RunArgs),

    /// Show what a run would change without applying it
    Plan(commands::PlanArgs),

    /// Compare the collection with the mapping store
    Audit(commands::AuditArgs),

    /// Apply mapping store migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    logging::init_logging(logging::DEFAULT_FILTER, config.log_format);

    let result = match cli.command {
        Commands::Run(args) => commands::run(&config, args).await,
        Commands::Plan(args) => commands::plan(&config, args).await,
        Commands::Audit(args) => commands::audit(&config, args).await,
        Commands::Migrate => commands::migrate(&config).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
