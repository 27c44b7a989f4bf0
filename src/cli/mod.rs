//! CLI module for the storage pool tool.
//!
//! This module provides the command-line interface and the rendering of
//! run outcomes.

mod commands;
mod output;

pub use commands::{ApplyArgs, Cli, Commands, ConnectionArgs, OutputFormat};
pub use output::OutputFormatter;
