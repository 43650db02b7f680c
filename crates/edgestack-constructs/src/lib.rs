//! # edgestack-constructs
//!
//! Typed constructs that declare groups of related resources on a
//! [`Stack`](edgestack_synth::stack::Stack).
//!
//! Each construct validates its inputs eagerly, so a malformed declaration
//! fails while the stack is being built rather than at deploy time.
//!
//! - [`ec2`]: VPC, subnets, routing and security groups.
//! - [`iam`]: Service roles and inline policies.
//! - [`logs`]: Log groups.
//! - [`ecs`]: Clusters, Fargate task definitions and services.
//! - [`elbv2`]: Application load balancers, listeners and target groups.
//! - [`apigatewayv2`]: HTTP APIs, VPC links, custom domains and routes.
//! - [`acm`]: DNS-validated certificates.
//! - [`route53`]: Alias records.

pub mod acm;
pub mod apigatewayv2;
pub mod ec2;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod logs;
pub mod route53;
