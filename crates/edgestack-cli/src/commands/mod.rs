//! CLI command definitions and dispatch.

pub mod list;
pub mod plan;
pub mod synth;
pub mod zone;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use edgestack_common::config::StageContext;
use edgestack_common::constants::DEFAULT_CONTEXT_FILE;
use edgestack_synth::app::App;
use edgestack_synth::context::ContextFile;

/// edgestack — Fargate service behind an HTTP API, as deployable stacks.
#[derive(Parser, Debug)]
#[command(name = "edgestack", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Stage settings shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Overrides applied on top of the environment.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Deployment stage (overrides `STAGE`).
    #[arg(long, global = true)]
    pub stage: Option<String>,

    /// Target account id (overrides `CDK_DEFAULT_ACCOUNT`).
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Region of the service stack (overrides `CDK_DEFAULT_REGION`).
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Region of the certificate stack.
    #[arg(long, global = true)]
    pub certificate_region: Option<String>,

    /// Docker build context of the service container.
    #[arg(long, global = true)]
    pub build_context: Option<PathBuf>,

    /// Path to the lookup context file.
    #[arg(long, global = true, default_value = DEFAULT_CONTEXT_FILE)]
    pub context: PathBuf,
}

impl GlobalArgs {
    /// Reads the stage context from the environment and applies the flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting hostname is invalid.
    pub fn stage_context(&self) -> anyhow::Result<StageContext> {
        let mut ctx = StageContext::from_env()?;
        if let Some(stage) = &self.stage {
            ctx = ctx.with_stage(stage)?;
        }
        if let Some(account) = &self.account {
            ctx = ctx.with_account(account);
        }
        if let Some(region) = &self.region {
            ctx = ctx.with_region(region);
        }
        if let Some(region) = &self.certificate_region {
            ctx = ctx.with_certificate_region(region);
        }
        if let Some(dir) = &self.build_context {
            ctx = ctx.with_build_context(dir);
        }
        Ok(ctx)
    }

    /// The stage context used for synthesis. The context file and
    /// `output_dir` are kept out of the container image fingerprint, since
    /// the CLI writes them itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting hostname is invalid.
    pub fn synth_context(&self, output_dir: Option<&Path>) -> anyhow::Result<StageContext> {
        let mut ctx = self.stage_context()?.with_asset_exclude(&self.context);
        if let Some(dir) = output_dir {
            ctx = ctx.with_asset_exclude(dir);
        }
        Ok(ctx)
    }

    /// Composes the app for the configured stage, resolving the hosted
    /// zone from the context file.
    ///
    /// # Errors
    ///
    /// Returns an error if the context file cannot be read or composition fails.
    pub fn load_app(&self, output_dir: Option<&Path>) -> anyhow::Result<(StageContext, App)> {
        let ctx = self.synth_context(output_dir)?;
        let zones = ContextFile::load(&self.context)?;
        tracing::debug!(
            stage = ctx.stage(),
            context = %self.context.display(),
            entries = zones.len(),
            "loaded lookup context"
        );
        let app = edgestack_stacks::compose(&ctx, &zones)?;
        Ok((ctx, app))
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize the cloud assembly into an output directory.
    Synth(synth::SynthArgs),
    /// Display the stacks and resources that would be synthesized.
    Plan(plan::PlanArgs),
    /// List stacks with their environments and dependencies.
    List(list::ListArgs),
    /// Record a hosted zone lookup result in the context file.
    Zone(zone::ZoneArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Synth(args) => synth::execute(&cli.global, args),
        Command::Plan(args) => plan::execute(&cli.global, args),
        Command::List(args) => list::execute(&cli.global, args),
        Command::Zone(args) => zone::execute(&cli.global, args),
    }
}
