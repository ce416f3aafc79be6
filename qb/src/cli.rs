//! CLI argument parsing for queuebroker

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qb")]
#[command(author, version, about = "Minimal named-queue broker", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Broker host (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Broker port (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the broker in the foreground until Ctrl+C
    Serve,

    /// Check that a broker is answering
    Ping,

    /// Show how many payloads wait in a queue
    Len {
        /// Queue name
        #[arg(required = true)]
        queue: String,
    },

    /// Drop a queue and its contents
    Purge {
        /// Queue name
        #[arg(required = true)]
        queue: String,
    },
}
