// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `dagrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagrun",
    version,
    about = "Run a DAG of shell steps with dependencies, retries and preconditions.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a DAG in the foreground.
    Start {
        /// Positional parameters, replacing the file's `params`.
        #[arg(long, value_name = "PARAMS", allow_hyphen_values = true)]
        params: Option<String>,

        /// Path to the DAG file (TOML).
        config: PathBuf,
    },

    /// Re-run a prior run, re-attempting only failed or canceled steps
    /// and everything downstream of them.
    Retry {
        /// Run identifier of the run to retry.
        #[arg(long = "req", value_name = "RUN_ID")]
        run_id: String,

        config: PathBuf,
    },

    /// Print the pid and status of a DAG.
    Status { config: PathBuf },

    /// Stop a running DAG.
    Stop { config: PathBuf },

    /// Parse + validate, print the DAG, but don't execute any commands.
    Dry { config: PathBuf },

    /// List the DAG files in a directory with their latest status.
    List {
        /// Directory holding `*.toml` DAG files.
        dir: PathBuf,
    },
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

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
