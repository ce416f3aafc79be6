//! CLI argument parsing for queuerpc

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rq")]
#[command(author, version, about = "Request/response messaging over a queue broker", long_about = None)]
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
    /// Check that the broker is answering
    Ping,

    /// Send one request and print the response
    Call {
        /// Operation name, sent as the "op" field of the payload
        #[arg(required = true)]
        op: String,

        /// Payload fields as key=value; values are parsed as JSON when possible
        #[arg(short, long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// How long to wait for the response (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Answer requests by echoing their payload until Ctrl+C
    Worker {
        /// Own the broker instead of connecting to a running one
        #[arg(long)]
        bind: bool,
    },
}
