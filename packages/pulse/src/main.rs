use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stream_buffer::DirectionFilter;
use tab_manager::TabProtocol;
use tracing_subscriber::prelude::*;

mod cli;
mod config;
mod router;
mod runtime;

use crate::cli::ReplayOptions;
use crate::config::PulseConfig;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Multi-protocol session runtime with a bounded stream buffer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.pulse)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a newline-delimited JSON message log through the stream buffer
    Replay(ReplayArgs),

    /// Drive concurrent synthetic producers and report buffer statistics
    Simulate(SimulateArgs),

    /// Print the resolved configuration as TOML
    Config,
}

#[derive(Parser)]
struct ReplayArgs {
    /// Message log, one JSON message per line
    file: PathBuf,

    /// Route the log into a tab of this protocol (websocket, sse, grpc-stream, kafka, mqtt)
    #[arg(short, long)]
    protocol: Option<TabProtocol>,

    /// Only show one direction (all, inbound, outbound, error, system)
    #[arg(short, long, default_value = "all")]
    filter: DirectionFilter,

    /// Case-insensitive payload search
    #[arg(short, long)]
    search: Option<String>,

    /// Output as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct SimulateArgs {
    /// Number of streaming tabs
    #[arg(short, long, default_value = "4")]
    tabs: usize,

    /// Messages emitted per tab
    #[arg(short, long, default_value = "2000")]
    messages: usize,
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "pulse=debug,stream_buffer=debug,tab_manager=debug,info"
    } else {
        "pulse=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let paths = PulseConfig::new(cli.data_dir)?;
    let config = paths.load()?;

    match cli.command {
        Commands::Replay(args) => {
            let options = ReplayOptions {
                protocol: args.protocol,
                filter: args.filter,
                search: args.search,
                json: args.json,
            };
            cli::replay_command(&config, &args.file, options).await
        }
        Commands::Simulate(args) => cli::simulate_command(&config, args.tabs, args.messages).await,
        Commands::Config => cli::config_command(&paths, &config),
    }
}
