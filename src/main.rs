//! BPM Assets CLI application
//!
//! Command-line interface for checking, applying and repairing the local copy
//! of the BPM catalog (song records, jacket images and course lists).

use std::process;

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use bpm_assets::cli::{
    handle_check, handle_force_sync, handle_reset, handle_seed, handle_status, handle_update, Cli,
    Commands,
};
use bpm_assets::config::AppConfig;
use bpm_assets::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    init_logging(&cli);

    info!("BPM Assets v{} starting", env!("CARGO_PKG_VERSION"));

    if cli.global.config.is_none() {
        if let Err(e) = AppConfig::initialize_first_run().await {
            warn!("Could not create default configuration: {}", e);
        }
    }

    let global = &cli.global;
    match cli.command {
        Commands::Check(args) => {
            info!("Executing check command");
            handle_check(global, args).await
        }
        Commands::Update(args) => {
            info!("Executing update command");
            handle_update(global, args).await
        }
        Commands::ForceSync => {
            info!("Executing force-sync command");
            handle_force_sync(global).await
        }
        Commands::Status(args) => {
            info!("Executing status command");
            handle_status(global, args).await
        }
        Commands::Seed(args) => {
            info!("Executing seed command");
            handle_seed(global, args).await
        }
        Commands::Reset(args) => {
            info!("Executing reset command");
            handle_reset(global, args).await
        }
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let mut filter = EnvFilter::from_default_env();
    match format!("bpm_assets={}", log_level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Invalid log directive: {}", e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
