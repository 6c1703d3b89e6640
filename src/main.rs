//! CLI entry point: start the driver and block until interrupted, or query
//! status of a running instance's on-disk configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neurolink::{Config, Supervisor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "neurolinkd", version, about = "Implant link driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, stream, and run the closed-loop therapy controller until
    /// interrupted.
    Run {
        /// Start streaming immediately once connected.
        #[arg(long)]
        stream: bool,
    },
    /// Print the on-disk configuration that `run` would load.
    Status,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { stream } => run(stream),
        Command::Status => status(),
    }
}

fn run(start_streaming: bool) -> Result<()> {
    let config = Config::load();
    let supervisor = Supervisor::new(config);

    supervisor.subscribe(|event| log::info!("client event: {event:?}"));

    supervisor.start().context("failed to start the driver")?;
    log::info!("neurolinkd running, status = {:?}", supervisor.status());

    if start_streaming {
        supervisor.start_streaming();
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Release))
        .context("failed to install Ctrl-C handler")?;

    while !interrupted.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutting down");
    supervisor.stop();
    Ok(())
}

fn status() -> Result<()> {
    let config = Config::load();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
