//! Networking: VPC, subnets, routing and security groups.

pub mod cidr;
pub mod security_group;
pub mod vpc;

pub use cidr::Ipv4Cidr;
pub use security_group::SecurityGroup;
pub use vpc::{Subnet, SubnetConfiguration, SubnetSelection, SubnetType, Vpc, VpcProps};
