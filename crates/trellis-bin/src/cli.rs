// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Serve the demo model until a shutdown signal (default)
//! - `validate`: Validate a configuration file
//! - `browse`: Print the address space built for the demo model
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Trellis - address-space synchronization for live subject graphs
///
/// Mirrors an in-memory subject graph onto an OPC UA style address space
/// and keeps both sides in sync.
#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    author = "Sylvex <contact@sylvex.io>",
    version = trellis_opcua::VERSION,
    about = "Address-space synchronization for live subject graphs",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path (defaults apply when omitted)
    #[arg(short, long, env = "TRELLIS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(short, long, env = "TRELLIS_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config
    #[arg(long, env = "TRELLIS_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the Trellis CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the demo model
    ///
    /// This is the default command when no subcommand is specified. The
    /// engine is hosted behind an in-process endpoint and restarted with
    /// backoff when the endpoint fails.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration without starting the engine.
    Validate(ValidateArgs),

    /// Print the address space built for the demo model
    Browse(BrowseArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Interval between simulated machine readings in milliseconds
    #[arg(long, default_value = "1000")]
    pub tick_ms: u64,

    /// Do not simulate machine readings
    #[arg(long)]
    pub no_simulation: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `browse` command.
#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    /// Node to start from, e.g. `ns=2;s=Root.Lines[0]` (defaults to the root)
    #[arg(short, long)]
    pub node: Option<String>,

    /// Maximum depth to descend
    #[arg(short, long, default_value = "16")]
    pub depth: usize,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<trellis_config::LogFormat> for LogFormat {
    fn from(format: trellis_config::LogFormat) -> Self {
        match format {
            trellis_config::LogFormat::Text => LogFormat::Text,
            trellis_config::LogFormat::Json => LogFormat::Json,
            trellis_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Returns the log level from the flags, or `fallback` from the config.
    pub fn effective_log_level<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or(fallback)
        }
    }

    /// Returns the log format from the flags, or `fallback` from the config.
    pub fn effective_log_format(&self, fallback: trellis_config::LogFormat) -> LogFormat {
        self.log_format.unwrap_or_else(|| fallback.into())
    }
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            no_simulation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["trellis"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["trellis", "run", "--tick-ms", "250"]);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.tick_ms, 250);
                assert!(!args.no_simulation);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_browse_command() {
        let cli = Cli::parse_from(["trellis", "browse", "-n", "ns=2;s=Root.Lines[0]", "-f", "json"]);
        match cli.command {
            Some(Commands::Browse(args)) => {
                assert_eq!(args.node.as_deref(), Some("ns=2;s=Root.Lines[0]"));
                assert_eq!(args.format, OutputFormat::Json);
                assert_eq!(args.depth, 16);
            }
            other => panic!("expected browse, got {other:?}"),
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["trellis", "-c", "/etc/trellis/trellis.yaml", "validate"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/trellis/trellis.yaml")));
    }

    #[test]
    fn test_log_level_precedence() {
        let cli = Cli::parse_from(["trellis"]);
        assert_eq!(cli.effective_log_level("error"), "error");

        let cli = Cli::parse_from(["trellis", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("error"), "trace");

        let cli = Cli::parse_from(["trellis", "-q", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("error"), "warn");

        let cli = Cli::parse_from(["trellis", "-v"]);
        assert_eq!(cli.effective_log_level("error"), "debug");
    }

    #[test]
    fn test_log_format_fallback() {
        let cli = Cli::parse_from(["trellis"]);
        assert_eq!(cli.effective_log_format(trellis_config::LogFormat::Json), LogFormat::Json);

        let cli = Cli::parse_from(["trellis", "--log-format", "compact"]);
        assert_eq!(cli.effective_log_format(trellis_config::LogFormat::Json), LogFormat::Compact);
    }
}
