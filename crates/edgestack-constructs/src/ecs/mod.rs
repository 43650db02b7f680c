//! Container orchestration: clusters, Fargate task definitions and services.

pub mod cluster;
pub mod image;
pub mod service;
pub mod task_definition;

pub use cluster::Cluster;
pub use image::ContainerImage;
pub use service::{FargateService, FargateServiceProps};
pub use task_definition::{
    AwsLogDriver, ContainerDefinition, ContainerDefinitionOptions, FargateTaskDefinition,
    FargateTaskDefinitionProps, PortMapping, Protocol,
};
