//! `edgestack synth` — Write the cloud assembly to disk.

use std::path::PathBuf;

use clap::Args;
use edgestack_common::constants::DEFAULT_OUTPUT_DIR;

use super::GlobalArgs;

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Output directory of the assembly.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,
}

/// Executes the `synth` command.
///
/// Composes both stacks, synthesizes the app and writes the manifest,
/// templates and asset manifests into the output directory.
///
/// # Errors
///
/// Returns an error if composition, synthesis or writing fails.
pub fn execute(global: &GlobalArgs, args: SynthArgs) -> anyhow::Result<()> {
    let (ctx, app) = global.load_app(Some(&args.out))?;
    let assembly = app.synth()?;
    let written = assembly.write_to(&args.out)?;

    println!("Synthesized stage {} ({})", ctx.stage(), ctx.hostname());
    for stack in assembly.deployment_order() {
        println!("  {stack}");
    }
    println!();
    println!("  {} file(s) written to {}", written.len(), args.out.display());
    Ok(())
}
