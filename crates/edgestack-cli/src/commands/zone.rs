//! `edgestack zone` — Record a hosted zone lookup in the context file.

use clap::Args;
use edgestack_stacks::CertificateStack;
use edgestack_synth::context::{ContextFile, HostedZone, HostedZoneQuery};

use super::GlobalArgs;

/// Arguments for the `zone` command.
#[derive(Args, Debug)]
pub struct ZoneArgs {
    /// Apex domain of the zone. Defaults to the stage's domain.
    #[arg(long)]
    pub domain: Option<String>,

    /// Hosted zone id, with or without the `/hostedzone/` prefix.
    #[arg(long)]
    pub zone_id: String,
}

/// Executes the `zone` command.
///
/// The entry is keyed by the certificate environment, where the
/// entrypoint performs its single lookup.
///
/// # Errors
///
/// Returns an error if the environment is not concrete or the context
/// file cannot be read or written.
pub fn execute(global: &GlobalArgs, args: ZoneArgs) -> anyhow::Result<()> {
    let ctx = global.stage_context()?;
    let domain = args.domain.as_deref().unwrap_or_else(|| ctx.domain_name());
    let query = HostedZoneQuery::new(
        domain,
        &ctx.certificate_env(),
        &CertificateStack::stack_name(ctx.stage()),
    )?;
    let zone = HostedZone::new(args.zone_id, query.domain_name());

    let mut context = ContextFile::load(&global.context)?;
    context.set_hosted_zone(&query, &zone)?;
    context.save()?;
    tracing::info!(key = %query.key(), zone_id = zone.zone_id(), "recorded hosted zone");

    println!("Recorded {} -> {}", query.key(), zone.zone_id());
    println!("  context: {}", global.context.display());
    Ok(())
}
