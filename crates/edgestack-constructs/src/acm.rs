//! TLS certificates.

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::{Hostname, LogicalId};
use edgestack_synth::context::HostedZone;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::{Stack, StackReference};
use serde_json::{Value, json};

/// How ownership of the domain is proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateValidation<'a> {
    /// Validation records are created in the given hosted zone.
    Dns(&'a HostedZone),
    /// An approval email is sent to the domain's contacts.
    Email,
}

/// A certificate requested from ACM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    id: LogicalId,
    domain_name: Hostname,
}

impl Certificate {
    /// Requests a certificate for `domain_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if DNS validation is requested against a zone that
    /// does not contain the domain, or if the path is already used.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        domain_name: &Hostname,
        validation: CertificateValidation<'_>,
    ) -> Result<Self> {
        let mut properties = json!({
            "DomainName": domain_name.as_str(),
            "Tags": [{"Key": "Name", "Value": format!("{}/{id}", stack.name())}],
        });
        match validation {
            CertificateValidation::Dns(zone) => {
                if !domain_name.is_within(zone.zone_name()) {
                    return Err(EdgestackError::config(format!(
                        "{domain_name} is not inside hosted zone {}",
                        zone.zone_name()
                    )));
                }
                properties["DomainValidationOptions"] = json!([{
                    "DomainName": domain_name.as_str(),
                    "HostedZoneId": zone.zone_id(),
                }]);
                properties["ValidationMethod"] = json!("DNS");
            }
            CertificateValidation::Email => {
                properties["ValidationMethod"] = json!("EMAIL");
            }
        }
        let certificate_id = stack.add_resource(
            &ConstructPath::root(id).child("Resource"),
            CfnResource::new("AWS::CertificateManager::Certificate").with_properties(properties),
        )?;
        tracing::info!(
            stack = stack.name(),
            certificate = %certificate_id,
            domain = domain_name.as_str(),
            "declared certificate"
        );
        Ok(Self {
            id: certificate_id,
            domain_name: domain_name.clone(),
        })
    }

    /// Logical id of the certificate.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// Domain the certificate covers.
    #[must_use]
    pub const fn domain_name(&self) -> &Hostname {
        &self.domain_name
    }

    /// `Ref` to the certificate, i.e. its ARN.
    #[must_use]
    pub fn certificate_arn(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// Exposes the certificate ARN to other stacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate was not declared in `stack`.
    pub fn export(&self, stack: &Stack) -> Result<StackReference> {
        stack.export_reference(&self.id, None)
    }
}

/// A certificate known only by its ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCertificate {
    arn: Value,
}

impl ImportedCertificate {
    /// Wraps an ARN expression, typically the result of [`Stack::import`].
    #[must_use]
    pub const fn from_certificate_arn(arn: Value) -> Self {
        Self { arn }
    }

    /// The ARN expression.
    #[must_use]
    pub const fn certificate_arn(&self) -> &Value {
        &self.arn
    }
}
