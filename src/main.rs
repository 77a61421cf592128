mod cli;
mod config;
mod dispatcher;
mod error;
mod logging;
mod scanner;
mod shutdown;
mod supervisor;
mod watcher;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cli::Cli;
use config::Config;
use dispatcher::Dispatcher;
use supervisor::{ProcessControl, Supervisor};
use watcher::WatchSet;

/// How long a clean shutdown waits for the dispatcher to release its watches.
const DISPATCH_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_from(cli::normalize_args(std::env::args_os()));

    if cli.directories.is_empty() {
        cli::print_usage();
        std::process::exit(1);
    }

    let config = Config::from_cli(cli)?;
    logging::init(config.quiet);

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    // Before anything is launched, so an early signal cannot orphan the child.
    let signals = shutdown::listen().context("failed to install signal handlers")?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let watch_set = WatchSet::build(&config.directories, config.recursive, event_tx)?;
    tracing::debug!("watching {} directories", watch_set.directories().len());

    let (supervisor, _supervisor_task) =
        Supervisor::spawn(config.command.clone(), config.command_args.clone())?;

    let run_flag = CancellationToken::new();
    let dispatcher = Dispatcher::new(watch_set, supervisor.clone(), event_rx, run_flag.clone());
    let mut dispatch = tokio::spawn(dispatcher.run());
    let shutdown_task = tokio::spawn(shutdown::handle(
        signals,
        supervisor.clone(),
        run_flag,
        shutdown::MAX_KILL_ATTEMPTS,
    ));

    tokio::select! {
        outcome = shutdown_task => {
            outcome.context("shutdown handler panicked")??;
            // The run flag is cleared: the dispatcher drains out and releases its watches.
            if tokio::time::timeout(DISPATCH_DRAIN, dispatch).await.is_err() {
                // The managed process is already dead; a stuck watcher must not hold the exit.
                tracing::warn!("dispatcher did not stop within {DISPATCH_DRAIN:?}, exiting anyway");
                std::process::exit(0);
            }
            Ok(())
        }
        Ok(Err(err)) = &mut dispatch => {
            if let Err(kill_err) = supervisor.terminate().await {
                tracing::error!("failed to stop managed process: {kill_err}");
            }
            Err(err)
        }
    }
}
