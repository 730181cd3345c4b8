//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, LaunchCommand, SetupCommand, ValidateCommand};

/// One-command installer and launcher for self-hosted AI web apps
#[derive(Debug, Parser, Clone)]
#[command(name = "greenroom")]
#[command(author = "Greenroom Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Install and launch self-hosted AI web apps from recipes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Stream step output and service logs to the terminal
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Install a recipe's application into its working directory
    Setup(SetupCommand),

    /// Start an installed application and wait for its URL
    Launch(LaunchCommand),

    /// Validate a recipe file
    Validate(ValidateCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

use std::ffi::OsString;
