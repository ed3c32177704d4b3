//! `toskose build`: Toskose a CSAR archive.

use std::path::PathBuf;

use clap::Args;
use toskose_common::config::ToskoseSettings;
use toskose_common::constants;
use toskose_image::docker::DockerEngine;
use toskose_image::prompt::ConsolePrompt;
use toskose_pipeline::Toskoserizator;

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Path to the CSAR archive (`.zip` or `.csar`).
    pub csar: PathBuf,

    /// Path to the toskose configuration file.
    pub config: Option<PathBuf>,

    /// Directory receiving the docker-compose file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Push the toskosed images to their registries.
    #[arg(short = 'p', long)]
    pub enable_push: bool,

    /// URL of the Docker engine (`unix://`, `tcp://`, or `http://`).
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_url: Option<String>,

    /// Also toskose containers hosting no software component.
    #[arg(long)]
    pub standalone: bool,

    /// Registry credential prompts allowed after a failed pull.
    #[arg(long, default_value_t = constants::DEFAULT_AUTH_ATTEMPTS)]
    pub auth_attempts: u32,

    /// Total push attempts per image.
    #[arg(long, default_value_t = constants::DEFAULT_PUSH_ATTEMPTS)]
    pub push_attempts: u32,

    /// docker-compose file format version.
    #[arg(long, default_value = constants::DEFAULT_DOCKER_COMPOSE_VERSION)]
    pub compose_version: String,
}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if the engine is unreachable or any pipeline stage fails.
pub fn execute(args: BuildArgs) -> anyhow::Result<()> {
    tracing::info!(csar = %args.csar.display(), "toskosing");
    let settings = ToskoseSettings {
        docker_url: args.docker_url,
        enable_push: args.enable_push,
        toskose_standalone: args.standalone,
        auth_attempts: args.auth_attempts,
        push_attempts: args.push_attempts,
        compose_version: args.compose_version,
        ..ToskoseSettings::default()
    };

    let engine = DockerEngine::connect(settings.docker_url.as_deref())?;
    let prompt = ConsolePrompt;
    let descriptor = Toskoserizator::new(&engine, &prompt, &prompt, settings).build(
        &args.csar,
        args.config.as_deref(),
        args.output.as_deref(),
    )?;

    println!("docker-compose file written to {}", descriptor.display());
    Ok(())
}
