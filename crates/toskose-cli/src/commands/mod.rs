//! CLI command definitions and dispatch.

pub mod build;
pub mod validate;

use clap::{Parser, Subcommand};

/// toskose: TOSCA applications to docker-compose, one supervisord per container.
#[derive(Parser, Debug)]
#[command(name = "toskose", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug output (overrides --quiet).
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only report errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Toskose a CSAR archive and generate its docker-compose file.
    Build(build::BuildArgs),
    /// Validate a CSAR archive and print its topology.
    Validate(validate::ValidateArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Build(args) => build::execute(args),
        Command::Validate(args) => validate::execute(&args),
    }
}
