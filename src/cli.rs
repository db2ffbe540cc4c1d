//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the persona pipeline.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

use crate::types::Namespace;

/// Persona Pipeline - audience personas from research data
///
/// Generates structured audience personas from survey exports or interview
/// transcripts with a language model, and scores marketing copy against them.
#[derive(Parser, Debug)]
#[command(name = "persona-pipeline")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "PERSONA_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate personas from survey or interview files
    Generate {
        /// Source namespace: csv, csv2, md
        #[arg(short, long)]
        namespace: Namespace,

        /// Input files (several markdown transcripts are merged)
        #[arg(short, long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Override the output directory
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Score marketing copy against saved personas
    #[command(group(ArgGroup::new("copy_source").required(true).args(["copy", "copy_file"])))]
    Score {
        /// Persona IDs to score with (e.g. csv_1)
        #[arg(short, long = "persona", required = true, num_args = 1..)]
        personas: Vec<String>,

        /// Marketing copy text
        #[arg(long)]
        copy: Option<String>,

        /// Read the marketing copy from a file
        #[arg(long)]
        copy_file: Option<PathBuf>,

        /// Also write the report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Saved persona management
    Personas {
        #[command(subcommand)]
        subcommand: PersonasSubcommand,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Persona subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum PersonasSubcommand {
    /// List saved personas
    List {
        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}
