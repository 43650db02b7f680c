//! Fargate services.

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::LogicalId;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

use super::cluster::Cluster;
use super::task_definition::FargateTaskDefinition;
use crate::ec2::{SecurityGroup, SubnetSelection, SubnetType};
use crate::elbv2::{ApplicationTarget, TargetGroupAttachment, TargetType};

/// Seconds a new task may fail health checks before it is replaced.
const HEALTH_CHECK_GRACE_PERIOD_SECONDS: u32 = 60;

/// Properties of a [`FargateService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FargateServiceProps {
    /// Number of tasks to keep running.
    pub desired_count: u32,
    /// Give each task a public IP. Requires public subnets.
    pub assign_public_ip: bool,
    /// Subnets to run tasks in; public ones when `assign_public_ip` is set
    /// and nothing else is chosen.
    pub vpc_subnets: SubnetSelection,
}

impl Default for FargateServiceProps {
    fn default() -> Self {
        Self {
            desired_count: 1,
            assign_public_ip: false,
            vpc_subnets: SubnetSelection::Default,
        }
    }
}

/// A service running a task definition on Fargate.
#[derive(Debug, Clone)]
pub struct FargateService {
    path: ConstructPath,
    id: LogicalId,
    security_group: SecurityGroup,
    container: String,
    container_port: Option<u16>,
}

impl FargateService {
    /// Declares a service under `id` with its own security group.
    ///
    /// # Errors
    ///
    /// Returns an error if the task definition has no container, if public
    /// IPs are requested outside public subnets, or if a path is already used.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        cluster: &Cluster,
        task_definition: &FargateTaskDefinition,
        props: FargateServiceProps,
    ) -> Result<Self> {
        let container = task_definition.default_container().ok_or_else(|| {
            EdgestackError::config(format!(
                "service {id} needs a task definition with at least one container"
            ))
        })?;
        let selection = match (props.assign_public_ip, props.vpc_subnets) {
            (true, SubnetSelection::Default) => SubnetSelection::Type(SubnetType::Public),
            (_, selection) => selection,
        };
        let subnets = cluster.vpc().select_subnets(selection)?;
        if props.assign_public_ip && subnets.iter().any(|s| s.subnet_type() != SubnetType::Public) {
            return Err(EdgestackError::config(format!(
                "service {id} assigns public IPs and must run in public subnets"
            )));
        }
        let subnet_ids: Vec<Value> = subnets.iter().map(|s| s.subnet_id()).collect();

        let path = ConstructPath::root(id);
        let description = format!("{}/{id}/SecurityGroup", stack.name());
        let security_group = SecurityGroup::new(stack, &path.child("SecurityGroup"), cluster.vpc(), &description)?;

        let mut service = CfnResource::new("AWS::ECS::Service").with_properties(json!({
            "Cluster": cluster.cluster_name(),
            "DeploymentConfiguration": { "MaximumPercent": 200, "MinimumHealthyPercent": 50 },
            "DesiredCount": props.desired_count,
            "EnableECSManagedTags": false,
            "LaunchType": "FARGATE",
            "NetworkConfiguration": {
                "AwsvpcConfiguration": {
                    "AssignPublicIp": if props.assign_public_ip { "ENABLED" } else { "DISABLED" },
                    "SecurityGroups": [security_group.group_id()],
                    "Subnets": subnet_ids,
                },
            },
            "TaskDefinition": task_definition.task_definition_arn(),
        }));
        service.add_dependency(task_definition.task_role().logical_id());
        let service_id = stack.add_resource(&path.child("Service"), service)?;

        tracing::info!(
            stack = stack.name(),
            service = %service_id,
            container = container.name(),
            desired_count = props.desired_count,
            "declared Fargate service"
        );
        Ok(Self {
            path,
            id: service_id,
            security_group,
            container: container.name().to_owned(),
            container_port: container.container_port(),
        })
    }

    /// Logical id of the service.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Fn::GetAtt Name` of the service.
    #[must_use]
    pub fn service_name(&self) -> Value {
        intrinsic::get_att(&self.id, "Name")
    }

    /// Security group of the service's tasks.
    #[must_use]
    pub const fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }
}

impl ApplicationTarget for FargateService {
    fn target_type(&self) -> TargetType {
        TargetType::Ip
    }

    fn attach_to_target_group(&mut self, stack: &mut Stack, attachment: &TargetGroupAttachment) -> Result<()> {
        let port = self.container_port.ok_or_else(|| {
            EdgestackError::config(format!(
                "container {} of service {} has no port mappings to register",
                self.container, self.path
            ))
        })?;
        let service = stack.resource_mut(&self.id)?;
        service.push_property(
            "LoadBalancers",
            json!({
                "ContainerName": self.container,
                "ContainerPort": port,
                "TargetGroupArn": intrinsic::reference(&attachment.target_group),
            }),
        );
        service.set_property("HealthCheckGracePeriodSeconds", json!(HEALTH_CHECK_GRACE_PERIOD_SECONDS));
        service.add_dependency(&attachment.listener);
        let _ = self.security_group.allow_from(
            stack,
            &attachment.load_balancer_security_group,
            port,
            "Load balancer to target",
        )?;
        tracing::debug!(service = %self.id, target_group = %attachment.target_group, port, "registered service with target group");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec2::{SubnetConfiguration, Vpc, VpcProps};
    use crate::ecs::{ContainerDefinitionOptions, ContainerImage, FargateTaskDefinitionProps, PortMapping};
    use crate::elbv2::{ApplicationLoadBalancer, ApplicationLoadBalancerProps};
    use crate::testing;

    fn setup(ports: Vec<PortMapping>) -> (Stack, Cluster, FargateTaskDefinition) {
        let mut stack = testing::stack();
        let props = VpcProps {
            subnet_configuration: vec![SubnetConfiguration::public()],
            ..VpcProps::default()
        };
        let vpc = Vpc::new(&mut stack, "Vpc", &props).expect("vpc");
        let cluster = Cluster::new(&mut stack, "Cluster", &vpc).expect("cluster");
        let mut task =
            FargateTaskDefinition::new(&mut stack, "TaskDef", &FargateTaskDefinitionProps::default()).expect("task");
        let options = ContainerDefinitionOptions {
            port_mappings: ports,
            ..ContainerDefinitionOptions::new(ContainerImage::from_registry("nginx"))
        };
        let _ = task.add_container(&mut stack, "MyContainer", options).expect("container");
        (stack, cluster, task)
    }

    #[test]
    fn public_ip_service_runs_in_public_subnets() {
        let (mut stack, cluster, task) = setup(vec![PortMapping::tcp(3000)]);
        let props = FargateServiceProps {
            assign_public_ip: true,
            ..FargateServiceProps::default()
        };
        let service = FargateService::new(&mut stack, "FargateService", &cluster, &task, props).expect("service");
        let resource = stack.resource(service.logical_id()).expect("resource");
        let network = &resource.property("NetworkConfiguration").expect("network")["AwsvpcConfiguration"];
        assert_eq!(network["AssignPublicIp"], "ENABLED");
        assert_eq!(network["Subnets"].as_array().map(Vec::len), Some(2));
        assert_eq!(resource.property("LaunchType"), Some(&json!("FARGATE")));
        assert!(resource.depends_on().contains(task.task_role().logical_id()));
    }

    #[test]
    fn public_ip_in_isolated_subnets_is_rejected() {
        let mut stack = testing::stack();
        let vpc = Vpc::new(&mut stack, "Vpc", &VpcProps::default()).expect("vpc");
        let cluster = Cluster::new(&mut stack, "Cluster", &vpc).expect("cluster");
        let mut task =
            FargateTaskDefinition::new(&mut stack, "TaskDef", &FargateTaskDefinitionProps::default()).expect("task");
        let _ = task
            .add_container(
                &mut stack,
                "Web",
                ContainerDefinitionOptions::new(ContainerImage::from_registry("nginx")),
            )
            .expect("container");
        let props = FargateServiceProps {
            assign_public_ip: true,
            vpc_subnets: SubnetSelection::Type(SubnetType::Isolated),
            ..FargateServiceProps::default()
        };
        assert!(FargateService::new(&mut stack, "Svc", &cluster, &task, props).is_err());
    }

    #[test]
    fn service_needs_a_container() {
        let mut stack = testing::stack();
        let vpc = Vpc::new(&mut stack, "Vpc", &VpcProps::default()).expect("vpc");
        let cluster = Cluster::new(&mut stack, "Cluster", &vpc).expect("cluster");
        let task =
            FargateTaskDefinition::new(&mut stack, "TaskDef", &FargateTaskDefinitionProps::default()).expect("task");
        assert!(FargateService::new(&mut stack, "Svc", &cluster, &task, FargateServiceProps::default()).is_err());
    }

    #[test]
    fn attaching_registers_container_port_and_ingress() {
        let (mut stack, cluster, task) = setup(vec![PortMapping::tcp(3000)]);
        let mut service =
            FargateService::new(&mut stack, "FargateService", &cluster, &task, FargateServiceProps::default())
                .expect("service");
        let mut alb = ApplicationLoadBalancer::new(
            &mut stack,
            "ALB",
            cluster.vpc(),
            ApplicationLoadBalancerProps::default(),
        )
        .expect("alb");
        let mut listener = alb.add_listener(&mut stack, "Listener", 80, true).expect("listener");
        let group = listener
            .add_targets(&mut stack, "Target", 80, &mut [&mut service])
            .expect("targets");

        let resource = stack.resource(service.logical_id()).expect("service resource");
        let balancers = resource.property("LoadBalancers").expect("load balancers");
        assert_eq!(balancers[0]["ContainerName"], "MyContainer");
        assert_eq!(balancers[0]["ContainerPort"], 3000);
        assert_eq!(balancers[0]["TargetGroupArn"], group.target_group_arn());
        assert_eq!(resource.property("HealthCheckGracePeriodSeconds"), Some(&json!(60)));
        assert!(resource.depends_on().contains(listener.logical_id()));

        let ingress: Vec<&LogicalId> = stack.resources_of_type("AWS::EC2::SecurityGroupIngress").collect();
        assert_eq!(ingress.len(), 1);
        let rule = stack.resource(ingress[0]).expect("rule");
        assert_eq!(rule.property("FromPort"), Some(&json!(3000)));
        assert_eq!(rule.property("SourceSecurityGroupId"), Some(&alb.security_group().group_id()));
        assert!(stack.to_template().is_ok());
    }

    #[test]
    fn attaching_without_ports_fails() {
        let (mut stack, cluster, task) = setup(Vec::new());
        let mut service =
            FargateService::new(&mut stack, "FargateService", &cluster, &task, FargateServiceProps::default())
                .expect("service");
        let mut alb = ApplicationLoadBalancer::new(
            &mut stack,
            "ALB",
            cluster.vpc(),
            ApplicationLoadBalancerProps::default(),
        )
        .expect("alb");
        let mut listener = alb.add_listener(&mut stack, "Listener", 80, true).expect("listener");
        let err = listener
            .add_targets(&mut stack, "Target", 80, &mut [&mut service])
            .unwrap_err();
        assert!(err.to_string().contains("no port mappings"), "got: {err}");
    }
}
