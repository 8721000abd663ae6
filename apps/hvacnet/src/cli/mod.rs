//! # hvacnet CLI Module
//!
//! This module implements the CLI interface for hvacnet.
//!
//! ## Available Commands
//!
//! - `reduce` - Reduce a network and write the result
//! - `inspect` - Show structural metrics of a network
//! - `checksum` - Reduce a network and print its replay checksum

mod commands;
mod prompt;

use clap::{Parser, Subcommand, ValueEnum};
use hvacnet_core::HvacError;
use std::path::PathBuf;

pub use commands::*;
pub use prompt::PromptHandler;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// hvacnet - HVAC network reduction
///
/// Contracts pipe strands, pumps, consumers and generators of a loaded
/// HVAC network into aggregates for simulation.
#[derive(Parser, Debug)]
#[command(name = "hvacnet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long = "json", global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format of a reduced network.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Canonical network as JSON, aggregates with their members
    #[default]
    Json,
    /// Plain network document, loadable as input again
    Document,
    /// Bit-exact postcard stream with blake3 header
    Canonical,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reduce a network
    Reduce {
        /// Path to the network document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Reduction configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Recorded answers to replay (JSON)
        #[arg(short, long)]
        answers: Option<PathBuf>,

        /// Write every answer of this run to a file (JSON)
        #[arg(long)]
        record: Option<PathBuf>,

        /// Output file for the reduced network
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short = 't', long, value_enum, default_value_t)]
        format: OutputFormat,

        /// Maximum number of passes, stopping early at a fixed point
        #[arg(short, long, default_value = "1")]
        passes: usize,

        /// Answer open questions with their defaults instead of prompting
        #[arg(long)]
        non_interactive: bool,
    },

    /// Show structural metrics of a network
    Inspect {
        /// Path to the network document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Reduction configuration (TOML), selects the patterns scanned
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Reduce a network and print its replay checksum
    Checksum {
        /// Path to the network document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Reduction configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Recorded answers to replay (JSON)
        #[arg(short, long)]
        answers: Option<PathBuf>,

        /// Maximum number of passes
        #[arg(short, long, default_value = "1")]
        passes: usize,

        /// Canonical export to verify against the computed checksum
        #[arg(long)]
        verify: Option<PathBuf>,

        /// Answer open questions with their defaults instead of prompting
        #[arg(long)]
        non_interactive: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), HvacError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Reduce {
            input,
            config,
            answers,
            record,
            output,
            format,
            passes,
            non_interactive,
        } => cmd_reduce(
            &ReduceArgs {
                input,
                config,
                answers,
                record,
                output,
                format,
                passes,
                non_interactive,
            },
            json_mode,
        ),
        Commands::Inspect { input, config } => cmd_inspect(&input, config.as_deref(), json_mode),
        Commands::Checksum {
            input,
            config,
            answers,
            passes,
            verify,
            non_interactive,
        } => cmd_checksum(
            &ReduceArgs {
                input,
                config,
                answers,
                record: None,
                output: None,
                format: OutputFormat::default(),
                passes,
                non_interactive,
            },
            verify.as_deref(),
            json_mode,
        ),
    }
}
