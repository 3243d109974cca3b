//! SAFS embedded services CLI
//!
//! Starts the in-process QUEUE, SEM and VAR services from a config file and
//! drives them from the command line.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "safs")]
#[command(about = "SAFS embedded services", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (safs.toml); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the producer/consumer queue demo
    Demo {
        /// Producer threads per queue
        #[arg(short, long, default_value_t = 10)]
        producers: usize,
        /// How long each drain waits for the next message
        #[arg(short, long, default_value_t = 1000)]
        wait_ms: u64,
    },

    /// Submit one request to an embedded service
    Request {
        /// Service name, e.g. QUEUE
        service: String,
        /// Request text, e.g. GET WAIT 500
        #[arg(trailing_var_arg = true, required = true)]
        request: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Demo { producers, wait_ms } => commands::demo::execute(&config, producers, wait_ms),
        Commands::Request { service, request } => {
            commands::request::execute(&config, &service, &request.join(" "))
        }
        Commands::Config => commands::config::execute(&config),
    }
}
