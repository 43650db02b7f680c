//! `edgestack plan` — Display the stacks and resources before synthesizing.

use clap::Args;
use edgestack_synth::app::App;

use super::GlobalArgs;
use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Only show the named stack.
    #[arg(long)]
    pub stack: Option<String>,
}

/// Executes the `plan` command.
///
/// Synthesizes the app in memory and prints every stack in deployment
/// order, with its resources in dependency order and the construct path
/// each was declared under.
///
/// # Errors
///
/// Returns an error if composition or synthesis fails, or if the
/// requested stack does not exist.
pub fn execute(global: &GlobalArgs, args: PlanArgs) -> anyhow::Result<()> {
    let (ctx, app) = global.load_app(None)?;
    let assembly = app.synth()?;

    let order: Vec<&String> = assembly
        .deployment_order()
        .iter()
        .filter(|name| args.stack.as_ref().is_none_or(|s| s == *name))
        .collect();
    if let Some(stack) = &args.stack {
        if order.is_empty() {
            anyhow::bail!("stack {stack} is not part of stage {}", ctx.stage());
        }
    }

    println!("Deployment Plan for: {}", ctx.hostname());
    println!("{}", output::rule(35));
    println!();

    let mut total = 0;
    for name in order {
        total += print_stack(&app, name)?;
    }

    println!();
    println!("  {total} resource(s) will be synthesized.");
    Ok(())
}

fn print_stack(app: &App, name: &str) -> anyhow::Result<usize> {
    let stack = app
        .stack(name)
        .ok_or_else(|| anyhow::anyhow!("stack {name} missing from app"))?;
    println!("  + {name}  ({})", stack.env());

    let ids = stack.resource_order()?;
    for id in &ids {
        if let Some(resource) = stack.resource(id) {
            let path = stack.path_of(id).map(ToString::to_string).unwrap_or_default();
            println!("      {id}  {}  {path}", resource.resource_type());
        }
    }
    for record in stack.imports() {
        println!("      <- {} from {}", record.reference.output_id(), record.reference.producer());
    }
    Ok(ids.len())
}
