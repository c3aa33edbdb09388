//! Command-line interface for banwatch
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::manifest::DEFAULT_CONFIG;

/// banwatch - watch a fail2ban jail and lift bans
#[derive(Parser)]
#[command(name = "banwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Jail to watch (overrides config)
    #[arg(short, long, global = true)]
    pub jail: Option<String>,

    /// Poll interval in seconds (overrides config)
    #[arg(short, long, global = true)]
    pub interval: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Poll the jail once and print its status
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Keep polling the jail and accept refresh/unban commands on stdin
    Watch,

    /// Lift the ban on an IPv4 address
    Unban {
        /// Address to unban
        address: String,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Config path, and whether it was given explicitly
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        }
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "banwatch", &mut std::io::stdout());
    }
}
