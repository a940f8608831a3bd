//! Command-line interface components
//!
//! This module contains CLI-specific code for the BPM Assets application,
//! including argument parsing, progress display and the command handlers.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    CheckArgs, Cli, Commands, GlobalArgs, ResetArgs, SeedArgs, StatusArgs, UpdateArgs,
};
pub use commands::{
    handle_check, handle_force_sync, handle_reset, handle_seed, handle_status, handle_update,
    Runtime,
};
pub use progress::{summary_lines, ProgressConfig, ProgressDisplay};
