//! Fargate task definitions and their containers.

use std::collections::BTreeMap;

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::LogicalId;
use edgestack_synth::asset::DockerImageAsset;
use edgestack_synth::intrinsic::{self, Pseudo};
use edgestack_synth::logical_id::{self, ConstructPath};
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Map, Value, json};

use super::image::ContainerImage;
use crate::iam::{PolicyStatement, Role};
use crate::logs::LogGroup;

/// Principal ECS tasks assume roles as.
const TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// Valid memory sizes (MiB) per task CPU value: `(cpu, min, max, step)`.
const FARGATE_SIZES: &[(u32, u32, u32, u32)] = &[
    (256, 512, 2048, 512),
    (512, 1024, 4096, 1024),
    (1024, 2048, 8192, 1024),
    (2048, 4096, 16384, 1024),
    (4096, 8192, 30720, 1024),
    (8192, 16384, 61440, 4096),
    (16384, 32768, 122_880, 8192),
];

/// Checks a CPU/memory pair against the sizes Fargate offers.
///
/// # Errors
///
/// Returns an error if the pair is not offered.
pub fn validate_fargate_size(cpu: u32, memory_mib: u32) -> Result<()> {
    let valid = FARGATE_SIZES.iter().any(|&(c, min, max, step)| {
        c == cpu && (min..=max).contains(&memory_mib) && (memory_mib - min) % step == 0
    });
    if valid {
        Ok(())
    } else {
        Err(EdgestackError::config(format!(
            "invalid Fargate task size: {cpu} CPU units with {memory_mib} MiB"
        )))
    }
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// A container port exposed to the task's network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port the container listens on.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortMapping {
    /// A TCP mapping for `container_port`.
    #[must_use]
    pub const fn tcp(container_port: u16) -> Self {
        Self {
            container_port,
            protocol: Protocol::Tcp,
        }
    }
}

/// Ship container output to CloudWatch Logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsLogDriver {
    /// Prefix of every log stream the container writes.
    pub stream_prefix: String,
    /// Retention of the log group, `None` for forever.
    pub retention_days: Option<u32>,
}

impl AwsLogDriver {
    /// Logs under `stream_prefix`, kept forever.
    #[must_use]
    pub fn new(stream_prefix: impl Into<String>) -> Self {
        Self {
            stream_prefix: stream_prefix.into(),
            retention_days: None,
        }
    }
}

/// Settings for one container in a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefinitionOptions {
    /// Image to run.
    pub image: ContainerImage,
    /// Hard memory limit in MiB.
    pub memory_limit_mib: Option<u32>,
    /// Reserved CPU units.
    pub cpu: Option<u32>,
    /// Exposed ports.
    pub port_mappings: Vec<PortMapping>,
    /// Log destination.
    pub logging: Option<AwsLogDriver>,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// Whether the task stops when this container stops.
    pub essential: bool,
}

impl ContainerDefinitionOptions {
    /// An essential container running `image` with nothing else set.
    #[must_use]
    pub const fn new(image: ContainerImage) -> Self {
        Self {
            image,
            memory_limit_mib: None,
            cpu: None,
            port_mappings: Vec::new(),
            logging: None,
            environment: BTreeMap::new(),
            essential: true,
        }
    }
}

/// A container added to a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefinition {
    name: String,
    port_mappings: Vec<PortMapping>,
    log_group: Option<LogicalId>,
}

impl ContainerDefinition {
    /// Container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exposed ports.
    #[must_use]
    pub fn port_mappings(&self) -> &[PortMapping] {
        &self.port_mappings
    }

    /// First exposed port, used when the container becomes a load balancer target.
    #[must_use]
    pub fn container_port(&self) -> Option<u16> {
        self.port_mappings.first().map(|m| m.container_port)
    }

    /// Log group the container writes to.
    #[must_use]
    pub const fn log_group(&self) -> Option<&LogicalId> {
        self.log_group.as_ref()
    }
}

/// Properties of a [`FargateTaskDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FargateTaskDefinitionProps {
    /// Task CPU units.
    pub cpu: u32,
    /// Task memory in MiB.
    pub memory_mib: u32,
    /// Task family; derived from the construct path when `None`.
    pub family: Option<String>,
}

impl Default for FargateTaskDefinitionProps {
    fn default() -> Self {
        Self {
            cpu: 256,
            memory_mib: 512,
            family: None,
        }
    }
}

/// A Fargate task definition.
///
/// The task role is declared up front. The execution role is declared the
/// first time a container needs it, either to pull from ECR or to write logs.
#[derive(Debug, Clone)]
pub struct FargateTaskDefinition {
    path: ConstructPath,
    id: LogicalId,
    cpu: u32,
    memory_mib: u32,
    task_role: Role,
    execution_role: Option<Role>,
    containers: Vec<ContainerDefinition>,
}

impl FargateTaskDefinition {
    /// Declares a task definition under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is not offered by Fargate or the path is
    /// already used.
    pub fn new(stack: &mut Stack, id: &str, props: &FargateTaskDefinitionProps) -> Result<Self> {
        validate_fargate_size(props.cpu, props.memory_mib)?;
        let path = ConstructPath::root(id);
        let task_role = Role::new(stack, &path.child("TaskRole"), TASKS_PRINCIPAL)?;
        let family = props.family.clone().unwrap_or_else(|| {
            format!("{}{}", logical_id::sanitize(stack.name()), logical_id::sanitize(id))
        });
        let task_id = stack.add_resource(
            &path.child("Resource"),
            CfnResource::new("AWS::ECS::TaskDefinition").with_properties(json!({
                "ContainerDefinitions": [],
                "Cpu": props.cpu.to_string(),
                "Family": family,
                "Memory": props.memory_mib.to_string(),
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "TaskRoleArn": task_role.arn(),
            })),
        )?;
        stack.require_property(
            &task_id,
            "ContainerDefinitions",
            "a task definition needs at least one container",
        );
        tracing::debug!(task_definition = %task_id, cpu = props.cpu, memory = props.memory_mib, "declared task definition");
        Ok(Self {
            path,
            id: task_id,
            cpu: props.cpu,
            memory_mib: props.memory_mib,
            task_role,
            execution_role: None,
            containers: Vec::new(),
        })
    }

    /// Logical id of the task definition.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the task definition, i.e. its ARN.
    #[must_use]
    pub fn task_definition_arn(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// Role the application inside the task runs as.
    #[must_use]
    pub const fn task_role(&self) -> &Role {
        &self.task_role
    }

    /// Role ECS uses to pull images and ship logs, if one was needed.
    #[must_use]
    pub const fn execution_role(&self) -> Option<&Role> {
        self.execution_role.as_ref()
    }

    /// Containers in declaration order.
    #[must_use]
    pub fn containers(&self) -> &[ContainerDefinition] {
        &self.containers
    }

    /// The first essential container.
    #[must_use]
    pub fn default_container(&self) -> Option<&ContainerDefinition> {
        self.containers.first()
    }

    /// Adds a container named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken, if the container asks for more
    /// memory or CPU than the task has, if a port is mapped twice, or if a
    /// supporting resource cannot be declared.
    pub fn add_container(
        &mut self,
        stack: &mut Stack,
        name: &str,
        options: ContainerDefinitionOptions,
    ) -> Result<&ContainerDefinition> {
        self.check_container(name, &options)?;

        let container_path = self.path.child(name);
        let image = options.image.bind(stack);
        if let ContainerImage::Asset(_) = &options.image {
            self.grant_ecr_pull(stack)?;
        }

        let mut definition = Map::new();
        let _ = definition.insert("Name".into(), json!(name));
        let _ = definition.insert("Image".into(), image);
        let _ = definition.insert("Essential".into(), json!(options.essential));
        if let Some(memory) = options.memory_limit_mib {
            let _ = definition.insert("Memory".into(), json!(memory));
        }
        if let Some(cpu) = options.cpu {
            let _ = definition.insert("Cpu".into(), json!(cpu));
        }
        if !options.port_mappings.is_empty() {
            let mappings: Vec<Value> = options.port_mappings.iter().map(render_port_mapping).collect();
            let _ = definition.insert("PortMappings".into(), json!(mappings));
        }
        if !options.environment.is_empty() {
            let vars: Vec<Value> = options
                .environment
                .iter()
                .map(|(k, v)| json!({ "Name": k, "Value": v }))
                .collect();
            let _ = definition.insert("Environment".into(), json!(vars));
        }

        let mut log_group = None;
        if let Some(driver) = &options.logging {
            let group = LogGroup::new(stack, &container_path.child("LogGroup"), driver.retention_days)?;
            let _ = self.ensure_execution_role(stack)?.add_to_policy(
                stack,
                &PolicyStatement::allow(["logs:CreateLogStream", "logs:PutLogEvents"], vec![group.arn()]),
            )?;
            let _ = definition.insert(
                "LogConfiguration".into(),
                json!({
                    "LogDriver": "awslogs",
                    "Options": {
                        "awslogs-group": group.log_group_name(),
                        "awslogs-region": intrinsic::pseudo(Pseudo::Region),
                        "awslogs-stream-prefix": driver.stream_prefix,
                    },
                }),
            );
            log_group = Some(group.logical_id().clone());
        }

        stack
            .resource_mut(&self.id)?
            .push_property("ContainerDefinitions", Value::Object(definition));
        tracing::debug!(task_definition = %self.id, container = name, "added container");

        self.containers.push(ContainerDefinition {
            name: name.to_owned(),
            port_mappings: options.port_mappings,
            log_group,
        });
        self.containers
            .last()
            .ok_or_else(|| EdgestackError::config("container was not recorded"))
    }

    /// Exposes more ports on an existing container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or a port is
    /// already mapped.
    pub fn add_port_mappings(&mut self, stack: &mut Stack, container: &str, mappings: &[PortMapping]) -> Result<()> {
        let not_found = || EdgestackError::NotFound {
            kind: "container",
            id: format!("{container} in {}", self.path),
        };
        let index = self
            .containers
            .iter()
            .position(|c| c.name == container)
            .ok_or_else(not_found)?;
        let mut combined = self.containers[index].port_mappings.clone();
        for mapping in mappings {
            if combined
                .iter()
                .any(|m| m.container_port == mapping.container_port && m.protocol == mapping.protocol)
            {
                return Err(EdgestackError::config(format!(
                    "container {container} maps port {} twice",
                    mapping.container_port
                )));
            }
            combined.push(*mapping);
        }

        let rendered: Vec<Value> = combined.iter().map(render_port_mapping).collect();
        let definition = stack
            .resource_mut(&self.id)?
            .property_mut("ContainerDefinitions")
            .and_then(Value::as_array_mut)
            .and_then(|defs| defs.iter_mut().find(|d| d["Name"] == container))
            .ok_or_else(not_found)?;
        definition["PortMappings"] = json!(rendered);
        self.containers[index].port_mappings = combined;
        tracing::debug!(task_definition = %self.id, container, ports = mappings.len(), "added port mappings");
        Ok(())
    }

    fn check_container(&self, name: &str, options: &ContainerDefinitionOptions) -> Result<()> {
        if self.containers.iter().any(|c| c.name == name) {
            return Err(EdgestackError::config(format!(
                "task definition {} already has a container named {name}",
                self.path
            )));
        }
        if options.memory_limit_mib.is_some_and(|m| m > self.memory_mib) {
            return Err(EdgestackError::config(format!(
                "container {name} asks for more memory than the task's {} MiB",
                self.memory_mib
            )));
        }
        if options.cpu.is_some_and(|c| c > self.cpu) {
            return Err(EdgestackError::config(format!(
                "container {name} asks for more CPU than the task's {} units",
                self.cpu
            )));
        }
        for (i, mapping) in options.port_mappings.iter().enumerate() {
            if options.port_mappings[..i]
                .iter()
                .any(|m| m.container_port == mapping.container_port && m.protocol == mapping.protocol)
            {
                return Err(EdgestackError::config(format!(
                    "container {name} maps port {} twice",
                    mapping.container_port
                )));
            }
        }
        Ok(())
    }

    fn ensure_execution_role(&mut self, stack: &mut Stack) -> Result<&mut Role> {
        if self.execution_role.is_none() {
            let role = Role::new(stack, &self.path.child("ExecutionRole"), TASKS_PRINCIPAL)?;
            stack
                .resource_mut(&self.id)?
                .set_property("ExecutionRoleArn", role.arn());
            self.execution_role = Some(role);
        }
        self.execution_role
            .as_mut()
            .ok_or_else(|| EdgestackError::config("execution role was not declared"))
    }

    fn grant_ecr_pull(&mut self, stack: &mut Stack) -> Result<()> {
        let repository_arn = intrinsic::sub(&format!(
            "arn:${{AWS::Partition}}:ecr:${{AWS::Region}}:${{AWS::AccountId}}:repository/{}",
            DockerImageAsset::repository_name()
        ));
        let role = self.ensure_execution_role(stack)?;
        let _ = role.add_to_policy(
            stack,
            &PolicyStatement::allow(
                [
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:BatchGetImage",
                    "ecr:GetDownloadUrlForLayer",
                ],
                vec![repository_arn],
            ),
        )?;
        let _ = role.add_to_policy(
            stack,
            &PolicyStatement::allow_all_resources(["ecr:GetAuthorizationToken"]),
        )?;
        Ok(())
    }
}

fn render_port_mapping(mapping: &PortMapping) -> Value {
    json!({ "ContainerPort": mapping.container_port, "Protocol": mapping.protocol.as_str() })
}
