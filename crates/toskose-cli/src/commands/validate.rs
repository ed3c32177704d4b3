//! `toskose validate`: Check a CSAR archive without touching the engine.

use std::path::PathBuf;

use clap::Args;
use toskose_tosca::archive;
use toskose_tosca::builder::TopologyModelBuilder;

/// Arguments for the `validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the CSAR archive (`.zip` or `.csar`).
    pub csar: PathBuf,

    /// Override a topology input (`name=value`), repeatable.
    #[arg(short, long = "input", value_parser = parse_input)]
    pub inputs: Vec<(String, String)>,
}

fn parse_input(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {raw}"))
}

/// Executes the `validate` command.
///
/// # Errors
///
/// Returns an error if the archive or its topology is invalid.
pub fn execute(args: &ValidateArgs) -> anyhow::Result<()> {
    let metadata = archive::validate(&args.csar)?;
    let dir = tempfile::tempdir()?;
    let manifest = archive::unpack(&args.csar, &metadata, dir.path())?;

    let builder = args
        .inputs
        .iter()
        .fold(TopologyModelBuilder::new(), |builder, (name, value)| {
            builder.input(name, value)
        });
    let model = builder.build(&manifest)?;

    println!("{} ({})", model.name, metadata.entry_definitions);
    for container in model.containers() {
        let image = container
            .container
            .source_image
            .as_ref()
            .map_or_else(|| String::from("-"), ToString::to_string);
        println!("  {} [{image}]", container.node.name);
        for software in model.hosted_software(container.id) {
            let operations: Vec<&str> = software
                .software
                .interfaces
                .iter()
                .map(|i| i.operation.as_str())
                .collect();
            println!("    {} ({})", software.node.name, operations.join(", "));
        }
    }
    for (node, _) in model.volumes() {
        println!("  {} [volume]", node.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_overrides_are_split_once() {
        assert_eq!(
            parse_input("url=http://a=b").expect("valid"),
            ("url".to_string(), "http://a=b".to_string())
        );
        assert!(parse_input("missing").is_err());
    }
}
