use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use layernet::quantities::Float;

use gen_config::gen_config;
use run::run;

mod gen_config;
mod run;

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default two-host, one-switch topology to a file
    GenConfig {
        /// File to write the topology config to
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Simulate a topology and print every outcome
    Run {
        /// Topology config file (JSON)
        #[arg(long)]
        topology: PathBuf,

        /// Print outcomes as JSON lines instead of a table
        #[arg(long)]
        json: bool,

        /// Track wall-clock time, running this many virtual seconds per second
        #[arg(long)]
        paced: Option<Float>,

        /// Log each outcome as it happens
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulate packets moving through hosts, switches and routers.", long_about = None)]
struct Args {
    #[command(subcommand)]
    pub command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::GenConfig { output } => gen_config(&output),
        Command::Run {
            topology,
            json,
            paced,
            verbose,
        } => run(&topology, json, paced, verbose),
    }
}
