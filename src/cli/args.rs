//! Command-line argument parsing for SandboxBuddy
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SandboxBuddy - Run tools inside a confined filesystem sandbox
#[derive(Parser, Debug)]
#[command(name = "sandboxbuddy")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Execute registered tools with path confinement, timeouts and auditing", long_about = None)]
pub struct Args {
    /// Configuration file path (~/.sandboxbuddy/config.toml by default)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors are logged)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one tool inside the sandbox
    Exec {
        /// Tool id (see `sandboxbuddy tools`)
        #[arg(value_name = "TOOL")]
        tool: String,

        /// Raw input: a path, or a JSON object of parameters
        #[arg(value_name = "INPUT")]
        input: String,

        /// Additional allowed root (repeatable)
        #[arg(short, long = "allow", value_name = "DIR")]
        allow: Vec<PathBuf>,

        /// Base directory for relative paths
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Time bound for this call in milliseconds
        #[arg(short, long, value_name = "MS")]
        timeout: Option<u64>,

        /// Session id recorded in the audit log
        #[arg(long)]
        session: Option<String>,
    },

    /// List registered tools
    Tools {
        /// Only show tools in this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default tracing filter when RUST_LOG is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "sandboxbuddy=info",
            Verbosity::VeryVerbose => "sandboxbuddy=debug",
        }
    }
}
