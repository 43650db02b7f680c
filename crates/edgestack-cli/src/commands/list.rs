//! `edgestack list` — List stacks with environments and dependencies.

use clap::Args;

use super::GlobalArgs;
use crate::output;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print stack names only.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if composition or synthesis fails.
pub fn execute(global: &GlobalArgs, args: ListArgs) -> anyhow::Result<()> {
    let (_, app) = global.load_app(None)?;
    let assembly = app.synth()?;
    let manifest = assembly.manifest();

    if args.quiet {
        for name in assembly.deployment_order() {
            println!("{name}");
        }
        return Ok(());
    }

    let rows: Vec<Vec<String>> = assembly
        .deployment_order()
        .iter()
        .filter_map(|name| manifest.artifacts.get(name).map(|a| (name, a)))
        .map(|(name, artifact)| {
            vec![
                name.clone(),
                artifact.environment.clone(),
                output::format_list(&artifact.dependencies),
            ]
        })
        .collect();
    print!("{}", output::format_table(&["STACK", "ENVIRONMENT", "DEPENDS ON"], &rows));
    Ok(())
}
