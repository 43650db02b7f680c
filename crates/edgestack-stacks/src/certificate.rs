//! The certificate stack.

use edgestack_common::config::StageContext;
use edgestack_common::error::Result;
use edgestack_common::types::Hostname;
use edgestack_constructs::acm::{Certificate, CertificateValidation};
use edgestack_synth::context::HostedZone;
use edgestack_synth::stack::{Stack, StackProps, StackReference};

/// Handle to a certificate issued for one hostname.
///
/// The service stack can only be built from one of these, so a service
/// without a certificate cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    reference: StackReference,
    domain_name: Hostname,
}

impl IssuedCertificate {
    /// Cross-stack reference to the certificate ARN.
    #[must_use]
    pub const fn reference(&self) -> &StackReference {
        &self.reference
    }

    /// Hostname the certificate covers.
    #[must_use]
    pub const fn domain_name(&self) -> &Hostname {
        &self.domain_name
    }
}

/// Stack holding the service certificate, deployed to the certificate region.
#[derive(Debug, Clone)]
pub struct CertificateStack {
    stack: Stack,
    certificate: IssuedCertificate,
}

impl CertificateStack {
    /// Stack name for `stage`.
    #[must_use]
    pub fn stack_name(stage: &str) -> String {
        format!("Certificate-{stage}")
    }

    /// Declares the certificate for the stage hostname, validated through `zone`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hostname is not inside `zone` or the stack
    /// name is invalid.
    pub fn new(ctx: &StageContext, zone: &HostedZone) -> Result<Self> {
        let mut stack = Stack::new(
            Self::stack_name(ctx.stage()),
            StackProps {
                env: ctx.certificate_env(),
                cross_region_references: true,
                description: Some(format!("TLS certificate for {}", ctx.hostname())),
            },
        )?;
        let certificate = Certificate::new(
            &mut stack,
            "Certificate",
            ctx.hostname(),
            CertificateValidation::Dns(zone),
        )?;
        let reference = certificate.export(&stack)?;
        tracing::info!(
            stack = stack.name(),
            env = %stack.env(),
            domain = %ctx.hostname(),
            "built certificate stack"
        );
        Ok(Self {
            stack,
            certificate: IssuedCertificate {
                reference,
                domain_name: certificate.domain_name().clone(),
            },
        })
    }

    /// The underlying stack.
    #[must_use]
    pub const fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Handle to pass to the service stack.
    #[must_use]
    pub const fn certificate(&self) -> &IssuedCertificate {
        &self.certificate
    }

    /// Releases the stack for adding to an app.
    #[must_use]
    pub fn into_stack(self) -> Stack {
        self.stack
    }
}
