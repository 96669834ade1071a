use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod settings;
mod utils;

/// Line-rate flow tracker
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a capture file through a flow tracker
    Replay {
        /// Capture file to read
        file: PathBuf,

        /// Tracker configuration file (TOML or JSON)
        #[clap(short, long)]
        config: Option<PathBuf>,

        /// Flows per address family (overrides the configuration)
        #[clap(short, long)]
        max_flows: Option<u32>,

        /// Number of busiest flows to list
        #[clap(short, long, default_value = "10")]
        top: usize,

        /// Print the summary as JSON
        #[clap(long)]
        json: bool,
    },

    /// Write a synthetic capture file
    Generate {
        /// Output file
        #[clap(short, long)]
        output: PathBuf,

        /// Number of distinct flows
        #[clap(short, long, default_value = "100")]
        flows: u32,

        /// Number of packets
        #[clap(short, long, default_value = "1000")]
        packets: usize,

        /// Percentage of flows that are IPv6
        #[clap(long, default_value = "0")]
        ipv6_share: u8,

        /// Seed for the packet order
        #[clap(long, default_value = "1")]
        seed: u64,
    },

    /// Measure analysis throughput on synthetic traffic
    Benchmark {
        /// Number of distinct flows
        #[clap(short, long, default_value = "10000")]
        flows: u32,

        /// Number of packets
        #[clap(short, long, default_value = "1000000")]
        packets: usize,

        /// Number of workers, each owning one tracker
        #[clap(short, long, default_value = "1")]
        workers: usize,

        /// Flows per address family in each worker's tracker
        #[clap(short, long)]
        max_flows: Option<u32>,

        /// Tracker configuration file (TOML or JSON)
        #[clap(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the records of a capture file
    Inspect {
        /// Capture file to read
        file: PathBuf,

        /// Maximum number of records to print
        #[clap(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // Execute the specified command
    match cli.command {
        Commands::Replay { file, config, max_flows, top, json } => {
            let tracker_config = settings::load_tracker_config(config.as_deref(), max_flows)?;
            commands::replay::run_replay(file, tracker_config, top, json).await?;
        },
        Commands::Generate { output, flows, packets, ipv6_share, seed } => {
            let options = commands::generate::GenerateOptions {
                flows,
                packets,
                ipv6_share,
                seed,
            };
            commands::generate::run_generate(output, options).await?;
        },
        Commands::Benchmark { flows, packets, workers, max_flows, config } => {
            let tracker_config = settings::load_tracker_config(config.as_deref(), max_flows)?;
            commands::benchmark::run_benchmark(flows, packets, workers, tracker_config).await?;
        },
        Commands::Inspect { file, limit } => {
            commands::inspect::run_inspect(file, limit).await?;
        },
    }

    Ok(())
}
