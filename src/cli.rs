//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the TOML config (falls back to $NEWS_PUBLISHER_CONFIG, then config/publisher.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect, filter, rank, generate and publish one post (default)
    Run,
    /// Validate config and credentials, then check the publish endpoint
    Check,
    /// Delete history rows older than N days
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },
    /// List history rows from the last N days
    History {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}
