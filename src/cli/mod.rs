//! CLI module for awsform.
//!
//! This module provides the command-line interface for creating, reading,
//! updating and deleting AWS resources from YAML documents.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
