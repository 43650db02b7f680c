//! Composition entrypoint.

use edgestack_common::config::StageContext;
use edgestack_common::error::Result;
use edgestack_constructs::ecs::ContainerImage;
use edgestack_synth::app::App;
use edgestack_synth::context::{HostedZoneProvider, HostedZoneQuery};

use crate::certificate::CertificateStack;
use crate::service::{ServiceStack, ServiceStackProps};

/// Builds the app for `ctx`, running the container built from the
/// context's build directory. The context's asset excludes are left out
/// of the image fingerprint.
///
/// # Errors
///
/// Returns an error if the build directory has no `Dockerfile`, or if
/// [`compose_with_image`] fails.
pub fn compose(ctx: &StageContext, zones: &dyn HostedZoneProvider) -> Result<App> {
    let image = ContainerImage::from_asset_excluding(ctx.build_context(), ctx.asset_excludes())?;
    compose_with_image(ctx, zones, image)
}

/// Builds the app for `ctx` with an explicit container image.
///
/// The hosted zone is looked up once, in the certificate environment, and
/// shared by both stacks.
///
/// # Errors
///
/// Returns an error if the certificate environment is not concrete, if no
/// zone is found for the domain, or if either stack fails to build.
pub fn compose_with_image(
    ctx: &StageContext,
    zones: &dyn HostedZoneProvider,
    image: ContainerImage,
) -> Result<App> {
    let query = HostedZoneQuery::new(
        ctx.domain_name(),
        &ctx.certificate_env(),
        &CertificateStack::stack_name(ctx.stage()),
    )?;
    let zone = zones.lookup_hosted_zone(&query)?;
    tracing::info!(
        stage = ctx.stage(),
        hostname = %ctx.hostname(),
        zone_id = zone.zone_id(),
        "resolved hosted zone"
    );

    let certificate = CertificateStack::new(ctx, &zone)?;
    let service = ServiceStack::new(
        ctx,
        ServiceStackProps {
            certificate: certificate.certificate(),
            zone: &zone,
            image,
        },
    )?;

    let mut app = App::new();
    app.add_stack(certificate.into_stack())?;
    app.add_stack(service.into_stack())?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use edgestack_common::error::EdgestackError;
    use edgestack_synth::context::{HostedZone, StaticZones};

    use super::*;

    fn zones() -> StaticZones {
        StaticZones::new().with_zone(HostedZone::new("/hostedzone/Z0123", "slippys.cool."))
    }

    fn ctx() -> StageContext {
        StageContext::new("dev")
            .expect("ctx")
            .with_account("123456789012")
            .with_region("eu-west-1")
    }

    #[test]
    fn compose_adds_certificate_then_service() {
        let app = compose_with_image(&ctx(), &zones(), ContainerImage::from_registry("node:20")).expect("app");
        let names: Vec<&str> = app.stacks().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Certificate-dev", "RestAPIStack-dev"]);
    }

    #[test]
    fn compose_requires_account() {
        let ctx = StageContext::new("dev").expect("ctx");
        let err = compose_with_image(&ctx, &zones(), ContainerImage::from_registry("node:20")).unwrap_err();
        assert!(matches!(err, EdgestackError::EnvironmentAgnostic { .. }));
    }

    #[test]
    fn compose_reports_missing_zone() {
        let err = compose_with_image(&ctx(), &StaticZones::new(), ContainerImage::from_registry("node:20"))
            .unwrap_err();
        assert!(matches!(err, EdgestackError::ZoneNotFound { .. }));
    }

    #[test]
    fn compose_needs_a_dockerfile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx().with_build_context(dir.path());
        let err = compose(&ctx, &zones()).unwrap_err();
        assert!(matches!(err, EdgestackError::NotFound { kind: "Dockerfile", .. }));
    }
}
