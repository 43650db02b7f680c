//! DNS records.

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::{Hostname, LogicalId};
use edgestack_synth::context::HostedZone;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

use crate::apigatewayv2::DomainName;

/// TTL of plain value records when none is given, in seconds.
const DEFAULT_TTL: u32 = 1800;

/// An AWS resource a record resolves to without a TTL of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTarget {
    dns_name: Value,
    hosted_zone_id: Value,
}

impl AliasTarget {
    /// Points at `dns_name` served from the hosted zone `hosted_zone_id`.
    #[must_use]
    pub const fn new(dns_name: Value, hosted_zone_id: Value) -> Self {
        Self {
            dns_name,
            hosted_zone_id,
        }
    }

    /// Points at the regional endpoint of an API Gateway custom domain.
    #[must_use]
    pub fn api_gateway_v2_domain(domain: &DomainName) -> Self {
        Self::new(domain.regional_domain_name(), domain.regional_hosted_zone_id())
    }
}

/// What a record resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTarget {
    /// An alias to an AWS resource.
    Alias(AliasTarget),
    /// Literal IPv4 addresses.
    Values(Vec<String>),
}

/// Properties of an [`ARecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARecordProps<'a> {
    /// Zone the record is created in.
    pub zone: &'a HostedZone,
    /// Fully qualified record name.
    pub record_name: Hostname,
    /// What the name resolves to.
    pub target: RecordTarget,
    /// TTL in seconds; only valid for value records.
    pub ttl: Option<u32>,
}

/// An IPv4 address record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARecord {
    id: LogicalId,
    name: Hostname,
}

impl ARecord {
    /// Declares the record under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is outside the zone, if an alias is
    /// given a TTL, if no values are given, or if the path is already used.
    pub fn new(stack: &mut Stack, id: &str, props: ARecordProps<'_>) -> Result<Self> {
        let zone = props.zone;
        if !props.record_name.is_within(zone.zone_name()) {
            return Err(EdgestackError::config(format!(
                "record {} is not inside hosted zone {}",
                props.record_name,
                zone.zone_name()
            )));
        }
        let mut properties = json!({
            "HostedZoneId": zone.zone_id(),
            "Name": props.record_name.as_str(),
            "Type": "A",
        });
        match &props.target {
            RecordTarget::Alias(alias) => {
                if props.ttl.is_some() {
                    return Err(EdgestackError::config(format!(
                        "alias record {} cannot have a TTL",
                        props.record_name
                    )));
                }
                properties["AliasTarget"] = json!({
                    "DNSName": alias.dns_name,
                    "HostedZoneId": alias.hosted_zone_id,
                });
            }
            RecordTarget::Values(values) => {
                if values.is_empty() {
                    return Err(EdgestackError::config(format!(
                        "record {} has no values",
                        props.record_name
                    )));
                }
                properties["ResourceRecords"] = json!(values);
                properties["TTL"] = json!(props.ttl.unwrap_or(DEFAULT_TTL).to_string());
            }
        }
        let record_id = stack.add_resource(
            &ConstructPath::root(id).child("Resource"),
            CfnResource::new("AWS::Route53::RecordSet").with_properties(properties),
        )?;
        tracing::info!(
            stack = stack.name(),
            record = %record_id,
            name = props.record_name.as_str(),
            zone = zone.zone_id(),
            "declared A record"
        );
        Ok(Self {
            id: record_id,
            name: props.record_name,
        })
    }

    /// Logical id of the record.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// Record name.
    #[must_use]
    pub const fn name(&self) -> &Hostname {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn zone() -> HostedZone {
        HostedZone::new("/hostedzone/Z0123", "slippys.cool.")
    }

    fn hostname() -> Hostname {
        Hostname::parse("poc-fargate-ecs.dev.slippys.cool").expect("hostname")
    }

    fn alias() -> RecordTarget {
        RecordTarget::Alias(AliasTarget::new(json!("d-abc.execute-api.aws"), json!("Z2FDTNDATAQYW2")))
    }

    #[test]
    fn alias_record_uses_exact_hostname() {
        let mut stack = testing::stack();
        let zone = zone();
        let record = ARecord::new(
            &mut stack,
            "ApiAliasRecord",
            ARecordProps {
                zone: &zone,
                record_name: hostname(),
                target: alias(),
                ttl: None,
            },
        )
        .expect("record");
        let resource = stack.resource(record.logical_id()).expect("resource");
        assert_eq!(resource.property("Name"), Some(&json!("poc-fargate-ecs.dev.slippys.cool")));
        assert_eq!(resource.property("HostedZoneId"), Some(&json!("Z0123")));
        assert_eq!(resource.property("Type"), Some(&json!("A")));
        assert_eq!(resource.property("AliasTarget").expect("alias")["HostedZoneId"], "Z2FDTNDATAQYW2");
        assert!(resource.property("TTL").is_none());
    }

    #[test]
    fn alias_with_ttl_is_rejected() {
        let mut stack = testing::stack();
        let zone = zone();
        let props = ARecordProps {
            zone: &zone,
            record_name: hostname(),
            target: alias(),
            ttl: Some(60),
        };
        assert!(ARecord::new(&mut stack, "Alias", props).is_err());
    }

    #[test]
    fn value_record_gets_default_ttl() {
        let mut stack = testing::stack();
        let zone = zone();
        let props = ARecordProps {
            zone: &zone,
            record_name: hostname(),
            target: RecordTarget::Values(vec!["10.0.0.1".into()]),
            ttl: None,
        };
        let record = ARecord::new(&mut stack, "Plain", props).expect("record");
        let resource = stack.resource(record.logical_id()).expect("resource");
        assert_eq!(resource.property("TTL"), Some(&json!("1800")));
        assert_eq!(resource.property("ResourceRecords"), Some(&json!(["10.0.0.1"])));
    }

    #[test]
    fn record_outside_zone_is_rejected() {
        let mut stack = testing::stack();
        let other = HostedZone::new("Z9", "example.com");
        let props = ARecordProps {
            zone: &other,
            record_name: hostname(),
            target: alias(),
            ttl: None,
        };
        assert!(ARecord::new(&mut stack, "Alias", props).is_err());
    }
}
