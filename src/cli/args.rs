//! Command-line argument parsing for BPM Assets
//!
//! This module defines the CLI structure using clap derive macros: update
//! checks, applying updates, integrity repair, store status and maintenance.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::{Lane, TransferStrategy};

/// BPM Assets - keep a local BPM catalog in sync with its origin
#[derive(Parser, Debug)]
#[command(
    name = "bpm_assets",
    version,
    about = "Synchronise song records, jacket images and course lists for a BPM catalog",
    long_about = "Works out which catalog files are missing or stale compared with the origin,
downloads only the differences, verifies their hashes and reconciles the local store."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Data directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Origin base URL or local mirror directory
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the origin for changes without downloading content
    Check(CheckArgs),

    /// Check and apply changes to the local store
    Update(UpdateArgs),

    /// Replace every category from the origin archives
    ForceSync,

    /// Show local store status
    Status(StatusArgs),

    /// Populate an empty store from a bundled directory
    Seed(SeedArgs),

    /// Delete all local content and settings
    Reset(ResetArgs),
}

/// Arguments for the check command
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Compare content hashes instead of existence only (repair lane)
    #[arg(long)]
    pub fix: bool,

    /// Detect changes using archive entity tags
    #[arg(long)]
    pub archive: bool,
}

/// Arguments for the update command
#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Compare content hashes instead of existence only (repair lane)
    #[arg(long)]
    pub fix: bool,

    /// Transfer changed categories as whole archives
    #[arg(long)]
    pub archive: bool,

    /// Dry run - show what would change without downloading
    #[arg(long)]
    pub dry_run: bool,

    /// Number of concurrent downloads
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Hash every local file against the origin manifests
    #[arg(long)]
    pub verify: bool,
}

/// Arguments for the seed command
#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    /// Bundle directory holding songs/, jackets/ and courses.json
    #[arg(long, value_name = "DIR")]
    pub from: PathBuf,

    /// Seed even if the store already holds content
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the reset command
#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Confirm deletion of all local content
    #[arg(long)]
    pub yes: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl CheckArgs {
    pub fn lane(&self) -> Lane {
        lane_for(self.fix)
    }

    pub fn strategy(&self) -> Option<TransferStrategy> {
        self.archive.then_some(TransferStrategy::Archive)
    }
}

impl UpdateArgs {
    pub fn lane(&self) -> Lane {
        lane_for(self.fix)
    }

    pub fn strategy(&self) -> Option<TransferStrategy> {
        self.archive.then_some(TransferStrategy::Archive)
    }

    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("Concurrency must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn lane_for(fix: bool) -> Lane {
    if fix {
        Lane::Fix
    } else {
        Lane::Update
    }
}
