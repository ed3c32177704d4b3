//! # toskose
//!
//! Turns a TOSCA application package into supervisord-managed container
//! images and a docker-compose deployment descriptor.

mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.debug, cli.quiet) {
        (true, _) => EnvFilter::new("debug"),
        (false, true) => EnvFilter::new("error"),
        (false, false) => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        }
    };
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    commands::execute(cli)
}
