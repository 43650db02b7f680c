//! Application load balancers, listeners and target groups.

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::LogicalId;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

use crate::ec2::{SecurityGroup, SubnetSelection, SubnetType, Vpc};

/// How a target group addresses its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// By private IP, as used by `awsvpc` tasks.
    Ip,
    /// By EC2 instance id.
    Instance,
}

impl TargetType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Instance => "instance",
        }
    }
}

/// Everything a target needs to register with a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupAttachment {
    /// Target group the target joins.
    pub target_group: LogicalId,
    /// Listener forwarding to the group; targets wait for it to exist.
    pub listener: LogicalId,
    /// Group traffic from the load balancer originates in.
    pub load_balancer_security_group: SecurityGroup,
}

/// Something a listener can forward to.
pub trait ApplicationTarget {
    /// How the target is addressed.
    fn target_type(&self) -> TargetType;

    /// Registers the target with a target group.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot receive traffic or its
    /// resources cannot be updated.
    fn attach_to_target_group(&mut self, stack: &mut Stack, attachment: &TargetGroupAttachment) -> Result<()>;
}

/// Properties of an [`ApplicationLoadBalancer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplicationLoadBalancerProps {
    /// Whether the load balancer gets public addresses.
    pub internet_facing: bool,
    /// Subnets to place the load balancer in.
    pub vpc_subnets: SubnetSelection,
}

/// An application load balancer.
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancer {
    path: ConstructPath,
    id: LogicalId,
    vpc_id: Value,
    security_group: SecurityGroup,
    listener_ports: Vec<u16>,
}

impl ApplicationLoadBalancer {
    /// Declares a load balancer under `id` with its own security group.
    ///
    /// Internal load balancers use `Scheme: internal`. Internet-facing ones
    /// default to the public subnets and must be placed there.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than two availability zones are selected,
    /// if an internet-facing load balancer is placed in non-public subnets,
    /// or if a path is already used.
    pub fn new(stack: &mut Stack, id: &str, vpc: &Vpc, props: ApplicationLoadBalancerProps) -> Result<Self> {
        let selection = match (props.internet_facing, props.vpc_subnets) {
            (true, SubnetSelection::Default) => SubnetSelection::Type(SubnetType::Public),
            (_, selection) => selection,
        };
        let subnets = vpc.select_subnets(selection)?;
        if props.internet_facing && subnets.iter().any(|s| s.subnet_type() != SubnetType::Public) {
            return Err(EdgestackError::config(format!(
                "internet-facing load balancer {id} must be placed in public subnets"
            )));
        }
        let mut zones: Vec<usize> = subnets.iter().map(|s| s.az_index()).collect();
        zones.sort_unstable();
        zones.dedup();
        if zones.len() < 2 {
            return Err(EdgestackError::config(format!(
                "load balancer {id} needs subnets in at least two availability zones"
            )));
        }
        let subnet_ids: Vec<Value> = subnets.iter().map(|s| s.subnet_id()).collect();

        let path = ConstructPath::root(id);
        let description = format!("Automatically created Security Group for ELB {}/{id}", stack.name());
        let security_group = SecurityGroup::new(stack, &path.child("SecurityGroup"), vpc, &description)?;
        let scheme = if props.internet_facing { "internet-facing" } else { "internal" };
        let lb_id = stack.add_resource(
            &path.child("Resource"),
            CfnResource::new("AWS::ElasticLoadBalancingV2::LoadBalancer").with_properties(json!({
                "LoadBalancerAttributes": [{"Key": "deletion_protection.enabled", "Value": "false"}],
                "Scheme": scheme,
                "SecurityGroups": [security_group.group_id()],
                "Subnets": subnet_ids,
                "Type": "application",
            })),
        )?;
        tracing::info!(stack = stack.name(), load_balancer = %lb_id, scheme, "declared load balancer");
        Ok(Self {
            path,
            id: lb_id,
            vpc_id: vpc.vpc_id(),
            security_group,
            listener_ports: Vec::new(),
        })
    }

    /// Logical id of the load balancer.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the load balancer, i.e. its ARN.
    #[must_use]
    pub fn load_balancer_arn(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// `Fn::GetAtt DNSName` of the load balancer.
    #[must_use]
    pub fn dns_name(&self) -> Value {
        intrinsic::get_att(&self.id, "DNSName")
    }

    /// Security group attached to the load balancer.
    #[must_use]
    pub const fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }

    /// Adds an HTTP listener. An `open` listener accepts traffic from any
    /// IPv4 address.
    ///
    /// The listener must be given targets before synthesis.
    ///
    /// # Errors
    ///
    /// Returns an error if the port already has a listener.
    pub fn add_listener(&mut self, stack: &mut Stack, id: &str, port: u16, open: bool) -> Result<ApplicationListener> {
        if self.listener_ports.contains(&port) {
            return Err(EdgestackError::config(format!(
                "load balancer {} already listens on port {port}",
                self.path
            )));
        }
        let path = self.path.child(id);
        let listener_id = stack.add_resource(
            &path.child("Resource"),
            CfnResource::new("AWS::ElasticLoadBalancingV2::Listener").with_properties(json!({
                "DefaultActions": [],
                "LoadBalancerArn": self.load_balancer_arn(),
                "Port": port,
                "Protocol": "HTTP",
            })),
        )?;
        stack.require_property(
            &listener_id,
            "DefaultActions",
            format!("listener {path} has no default action; add targets to it"),
        );
        if open {
            self.security_group.allow_from_any_ipv4(
                stack,
                port,
                &format!("Allow from anyone on port {port}"),
            )?;
        }
        self.listener_ports.push(port);
        tracing::debug!(listener = %listener_id, port, open, "declared listener");
        Ok(ApplicationListener {
            path,
            id: listener_id,
            vpc_id: self.vpc_id.clone(),
            load_balancer_security_group: self.security_group.clone(),
            default_target_group: None,
        })
    }
}

/// An HTTP listener on an [`ApplicationLoadBalancer`].
#[derive(Debug, Clone)]
pub struct ApplicationListener {
    path: ConstructPath,
    id: LogicalId,
    vpc_id: Value,
    load_balancer_security_group: SecurityGroup,
    default_target_group: Option<LogicalId>,
}

impl ApplicationListener {
    /// Logical id of the listener.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the listener, i.e. its ARN.
    #[must_use]
    pub fn listener_arn(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// Creates a target group on `port` holding `targets` and makes it the
    /// listener's default action.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener already has a default action, if no
    /// targets are given or they disagree on target type, or if a target
    /// cannot be attached.
    pub fn add_targets(
        &mut self,
        stack: &mut Stack,
        id: &str,
        port: u16,
        targets: &mut [&mut dyn ApplicationTarget],
    ) -> Result<ApplicationTargetGroup> {
        if self.default_target_group.is_some() {
            return Err(EdgestackError::config(format!(
                "listener {} already has a default action",
                self.path
            )));
        }
        let target_type = match &*targets {
            [] => {
                return Err(EdgestackError::config(format!(
                    "targets {id} on listener {} are empty",
                    self.path
                )));
            }
            [first, rest @ ..] => {
                let t = first.target_type();
                if rest.iter().any(|other| other.target_type() != t) {
                    return Err(EdgestackError::config(format!(
                        "targets {id} mix target types"
                    )));
                }
                t
            }
        };

        let group_id = stack.add_resource(
            &self.path.child(format!("{id}Group")).child("Resource"),
            CfnResource::new("AWS::ElasticLoadBalancingV2::TargetGroup").with_properties(json!({
                "Port": port,
                "Protocol": "HTTP",
                "TargetGroupAttributes": [{"Key": "stickiness.enabled", "Value": "false"}],
                "TargetType": target_type.as_str(),
                "VpcId": self.vpc_id,
            })),
        )?;
        stack.resource_mut(&self.id)?.push_property(
            "DefaultActions",
            json!({ "TargetGroupArn": intrinsic::reference(&group_id), "Type": "forward" }),
        );

        let attachment = TargetGroupAttachment {
            target_group: group_id.clone(),
            listener: self.id.clone(),
            load_balancer_security_group: self.load_balancer_security_group.clone(),
        };
        for target in targets.iter_mut() {
            target.attach_to_target_group(stack, &attachment)?;
        }
        self.default_target_group = Some(group_id.clone());
        tracing::debug!(listener = %self.id, target_group = %group_id, port, "forwarding listener to target group");
        Ok(ApplicationTargetGroup { id: group_id })
    }
}

/// A target group created by [`ApplicationListener::add_targets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationTargetGroup {
    id: LogicalId,
}

impl ApplicationTargetGroup {
    /// Logical id of the target group.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the target group, i.e. its ARN.
    #[must_use]
    pub fn target_group_arn(&self) -> Value {
        intrinsic::reference(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec2::{SubnetConfiguration, VpcProps};
    use crate::testing;

    #[derive(Default)]
    struct RecordingTarget {
        kind: Option<TargetType>,
        attachments: Vec<TargetGroupAttachment>,
    }

    impl ApplicationTarget for RecordingTarget {
        fn target_type(&self) -> TargetType {
            self.kind.unwrap_or(TargetType::Ip)
        }

        fn attach_to_target_group(&mut self, _stack: &mut Stack, attachment: &TargetGroupAttachment) -> Result<()> {
            self.attachments.push(attachment.clone());
            Ok(())
        }
    }

    fn public_vpc(stack: &mut Stack) -> Vpc {
        let props = VpcProps {
            subnet_configuration: vec![SubnetConfiguration::public()],
            ..VpcProps::default()
        };
        Vpc::new(stack, "Vpc", &props).expect("vpc")
    }

    #[test]
    fn internal_load_balancer_falls_back_to_public_subnets() {
        let mut stack = testing::stack();
        let vpc = public_vpc(&mut stack);
        let alb = ApplicationLoadBalancer::new(&mut stack, "ALB", &vpc, ApplicationLoadBalancerProps::default())
            .expect("alb");
        let resource = stack.resource(alb.logical_id()).expect("resource");
        assert_eq!(resource.property("Scheme"), Some(&json!("internal")));
        assert_eq!(
            resource.property("Subnets"),
            Some(&json!(vpc.subnet_ids(SubnetSelection::Type(SubnetType::Public)).expect("ids")))
        );
    }

    #[test]
    fn internet_facing_requires_public_subnets() {
        let mut stack = testing::stack();
        let vpc = Vpc::new(&mut stack, "Vpc", &VpcProps::default()).expect("vpc");
        let props = ApplicationLoadBalancerProps {
            internet_facing: true,
            vpc_subnets: SubnetSelection::Type(SubnetType::Isolated),
        };
        assert!(ApplicationLoadBalancer::new(&mut stack, "ALB", &vpc, props).is_err());

        let props = ApplicationLoadBalancerProps {
            internet_facing: true,
            vpc_subnets: SubnetSelection::Default,
        };
        let alb = ApplicationLoadBalancer::new(&mut stack, "PublicALB", &vpc, props).expect("alb");
        let scheme = stack.resource(alb.logical_id()).and_then(|r| r.property("Scheme")).cloned();
        assert_eq!(scheme, Some(json!("internet-facing")));
    }

    #[test]
    fn single_zone_is_rejected() {
        let mut stack = testing::stack();
        let props = VpcProps {
            max_azs: 1,
            subnet_configuration: vec![SubnetConfiguration::public()],
            ..VpcProps::default()
        };
        let vpc = Vpc::new(&mut stack, "Vpc", &props).expect("vpc");
        assert!(ApplicationLoadBalancer::new(&mut stack, "ALB", &vpc, ApplicationLoadBalancerProps::default()).is_err());
    }

    #[test]
    fn listener_without_targets_fails_validation() {
        let mut stack = testing::stack();
        let vpc = public_vpc(&mut stack);
        let mut alb = ApplicationLoadBalancer::new(&mut stack, "ALB", &vpc, ApplicationLoadBalancerProps::default())
            .expect("alb");
        let _ = alb.add_listener(&mut stack, "Listener", 80, true).expect("listener");
        let err = stack.to_template().unwrap_err();
        assert!(err.to_string().contains("no default action"), "got: {err}");
    }

    #[test]
    fn open_listener_admits_any_ipv4() {
        let mut stack = testing::stack();
        let vpc = public_vpc(&mut stack);
        let mut alb = ApplicationLoadBalancer::new(&mut stack, "ALB", &vpc, ApplicationLoadBalancerProps::default())
            .expect("alb");
        let _ = alb.add_listener(&mut stack, "Listener", 80, true).expect("listener");
        let sg = stack.resource(alb.security_group().logical_id()).expect("sg");
        let ingress = &sg.property("SecurityGroupIngress").expect("ingress")[0];
        assert_eq!(ingress["CidrIp"], "0.0.0.0/0");
        assert_eq!(ingress["FromPort"], 80);
        assert!(alb.add_listener(&mut stack, "Again", 80, true).is_err());
    }

    #[test]
    fn add_targets_forwards_and_attaches() {
        let mut stack = testing::stack();
        let vpc = public_vpc(&mut stack);
        let mut alb = ApplicationLoadBalancer::new(&mut stack, "ALB", &vpc, ApplicationLoadBalancerProps::default())
            .expect("alb");
        let mut listener = alb.add_listener(&mut stack, "Listener", 80, true).expect("listener");
        let mut target = RecordingTarget::default();
        let group = listener
            .add_targets(&mut stack, "Target", 80, &mut [&mut target])
            .expect("targets");

        assert_eq!(target.attachments.len(), 1);
        assert_eq!(&target.attachments[0].target_group, group.logical_id());
        assert_eq!(&target.attachments[0].listener, listener.logical_id());

        let tg = stack.resource(group.logical_id()).expect("tg");
        assert_eq!(tg.property("TargetType"), Some(&json!("ip")));
        assert_eq!(tg.property("Port"), Some(&json!(80)));
        let actions = stack
            .resource(listener.logical_id())
            .and_then(|r| r.property("DefaultActions"))
            .expect("actions");
        assert_eq!(actions, &json!([{"TargetGroupArn": group.target_group_arn(), "Type": "forward"}]));
        assert!(stack.to_template().is_ok());

        let mut another = RecordingTarget::default();
        assert!(listener
            .add_targets(&mut stack, "Second", 80, &mut [&mut another])
            .is_err());
    }

    #[test]
    fn add_targets_rejects_empty_and_mixed_targets() {
        let mut stack = testing::stack();
        let vpc = public_vpc(&mut stack);
        let mut alb = ApplicationLoadBalancer::new(&mut stack, "ALB", &vpc, ApplicationLoadBalancerProps::default())
            .expect("alb");
        let mut listener = alb.add_listener(&mut stack, "Listener", 80, true).expect("listener");
        assert!(listener.add_targets(&mut stack, "Empty", 80, &mut []).is_err());

        let mut ip = RecordingTarget::default();
        let mut instance = RecordingTarget {
            kind: Some(TargetType::Instance),
            ..RecordingTarget::default()
        };
        assert!(listener
            .add_targets(&mut stack, "Mixed", 80, &mut [&mut ip, &mut instance])
            .is_err());
    }
}
