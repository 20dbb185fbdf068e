// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `previewd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "previewd",
    version,
    about = "Run and supervise dev-server previews for task group workspaces.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory holding one workspace directory per task group.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Task group to start (repeatable).
    #[arg(long = "group", value_name = "ID", required = true)]
    pub groups: Vec<String>,

    /// Optional orchestrator options file (TOML, `[orchestrator]` table).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PREVIEWD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve and validate each group's preview config, print it, and exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Print start snapshots as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
