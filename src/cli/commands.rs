//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// awsform - Create, read, update and delete AWS resources from YAML documents.
#[derive(Parser, Debug)]
#[command(name = "awsform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the provider configuration file.
    #[arg(short, long, global = true, env = "AWSFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the provider configuration and, optionally, a document.
    Validate {
        /// Resource document to check.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Create the resource described by a document.
    Create {
        /// Resource document.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Read a resource by ID.
    Read {
        /// Resource type, e.g. `aws_s3_bucket`.
        resource_type: String,

        /// Resource ID.
        id: String,
    },

    /// Update a resource to the attributes of a document.
    Update {
        /// Resource document; must set `id`.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete a resource by ID.
    Delete {
        /// Resource type.
        resource_type: String,

        /// Resource ID.
        id: String,

        /// Delete a non-empty bucket by removing its objects first.
        #[arg(long)]
        force_destroy: bool,
    },

    /// Import an existing resource by ID.
    Import {
        /// Resource type.
        resource_type: String,

        /// Resource ID.
        id: String,
    },

    /// Run a data source query.
    Lookup {
        /// Data source type, e.g. `aws_ebs_volume`.
        data_source_type: String,

        /// Query document; its `attributes` are the query arguments.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the supported resource and data source types.
    Resources,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
