//! Security groups and ingress rules.

use edgestack_common::error::Result;
use edgestack_common::types::LogicalId;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::{self, ConstructPath};
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

use super::vpc::Vpc;

/// A security group with allow-all egress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    path: ConstructPath,
    id: LogicalId,
}

impl SecurityGroup {
    /// Declares a security group at `path` inside `vpc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already used.
    pub fn new(stack: &mut Stack, path: &ConstructPath, vpc: &Vpc, description: &str) -> Result<Self> {
        let id = stack.add_resource(
            &path.child("Resource"),
            CfnResource::new("AWS::EC2::SecurityGroup").with_properties(json!({
                "GroupDescription": description,
                "SecurityGroupEgress": [{
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                    "IpProtocol": "-1",
                }],
                "VpcId": vpc.vpc_id(),
            })),
        )?;
        Ok(Self {
            path: path.clone(),
            id,
        })
    }

    /// Logical id of the group.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Fn::GetAtt GroupId` of the group.
    #[must_use]
    pub fn group_id(&self) -> Value {
        intrinsic::get_att(&self.id, "GroupId")
    }

    /// Opens a TCP port to every IPv4 address with an inline rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the group is not declared in `stack`.
    pub fn allow_from_any_ipv4(&self, stack: &mut Stack, port: u16, description: &str) -> Result<()> {
        stack.resource_mut(&self.id)?.push_property(
            "SecurityGroupIngress",
            json!({
                "CidrIp": "0.0.0.0/0",
                "Description": description,
                "FromPort": port,
                "IpProtocol": "tcp",
                "ToPort": port,
            }),
        );
        Ok(())
    }

    /// Opens a TCP port to members of `peer` with a standalone ingress rule.
    ///
    /// A standalone rule keeps the two groups from referencing each other
    /// inline, which would form a cycle once both sides add rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule's path is already used.
    pub fn allow_from(
        &self,
        stack: &mut Stack,
        peer: &Self,
        port: u16,
        description: &str,
    ) -> Result<LogicalId> {
        let rule_id = format!("from{}:{port}", logical_id::sanitize(&peer.path.to_string()));
        stack.add_resource(
            &self.path.child(rule_id),
            CfnResource::new("AWS::EC2::SecurityGroupIngress").with_properties(json!({
                "Description": description,
                "FromPort": port,
                "GroupId": self.group_id(),
                "IpProtocol": "tcp",
                "SourceSecurityGroupId": peer.group_id(),
                "ToPort": port,
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec2::vpc::{SubnetConfiguration, VpcProps};
    use crate::testing;

    fn setup() -> (Stack, Vpc) {
        let mut stack = testing::stack();
        let props = VpcProps {
            subnet_configuration: vec![SubnetConfiguration::public()],
            ..VpcProps::default()
        };
        let vpc = Vpc::new(&mut stack, "Vpc", &props).expect("vpc");
        (stack, vpc)
    }

    #[test]
    fn group_allows_all_egress() {
        let (mut stack, vpc) = setup();
        let sg = SecurityGroup::new(&mut stack, &ConstructPath::root("Sg"), &vpc, "test").expect("sg");
        let resource = stack.resource(sg.logical_id()).expect("resource");
        assert_eq!(resource.property("SecurityGroupEgress").expect("egress")[0]["IpProtocol"], "-1");
        assert_eq!(resource.property("VpcId"), Some(&vpc.vpc_id()));
    }

    #[test]
    fn inline_ingress_accumulates() {
        let (mut stack, vpc) = setup();
        let sg = SecurityGroup::new(&mut stack, &ConstructPath::root("Sg"), &vpc, "test").expect("sg");
        sg.allow_from_any_ipv4(&mut stack, 80, "http").expect("80");
        sg.allow_from_any_ipv4(&mut stack, 443, "https").expect("443");
        let rules = stack
            .resource(sg.logical_id())
            .and_then(|r| r.property("SecurityGroupIngress"))
            .expect("ingress");
        assert_eq!(rules.as_array().map(Vec::len), Some(2));
        assert_eq!(rules[1]["FromPort"], 443);
    }

    #[test]
    fn peer_ingress_is_a_separate_resource() {
        let (mut stack, vpc) = setup();
        let alb = SecurityGroup::new(&mut stack, &ConstructPath::root("Alb").child("SecurityGroup"), &vpc, "alb")
            .expect("alb");
        let svc = SecurityGroup::new(&mut stack, &ConstructPath::root("Svc").child("SecurityGroup"), &vpc, "svc")
            .expect("svc");
        let rule = svc.allow_from(&mut stack, &alb, 3000, "from alb").expect("rule");
        let resource = stack.resource(&rule).expect("rule resource");
        assert_eq!(resource.resource_type(), "AWS::EC2::SecurityGroupIngress");
        assert_eq!(resource.property("SourceSecurityGroupId"), Some(&alb.group_id()));
        assert_eq!(resource.property("FromPort"), Some(&json!(3000)));
        assert!(svc.allow_from(&mut stack, &alb, 3000, "again").is_err());
    }
}
