use anyhow::Context;
use clap::Parser;
use tracing::info;

use kiln_observe::logger_init;

mod cli;
mod commands;
mod config;
mod daemon;

use cli::{Cli, Command};
use config::DaemonConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = DaemonConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => {
            println!(
                "{}: ok ({} node types, providers: {})",
                cli.config.display(),
                config.nodes.len(),
                config.providers.names().join(", ")
            );
            Ok(())
        }
        Command::Resolve { reason } => {
            println!("{}", commands::describe_resolution(&reason, &config.nodes));
            Ok(())
        }
        Command::Run => {
            if let Some(level) = cli.log_level {
                config.logging = config.logging.with_level(level);
            }
            // Before the runtime starts its threads, so the local offset can be read.
            let filter = logger_init(&config.logging)?;
            info!(config = %cli.config.display(), %filter, "kilnd: starting");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("tokio runtime")?;
            runtime.block_on(daemon::run(config))
        }
    }
}
