//! # edgestack-stacks
//!
//! The two deployment units and the entrypoint that wires them together.
//!
//! - [`certificate`]: a DNS-validated certificate for the service hostname.
//! - [`service`]: the Fargate service behind a load balancer, VPC link and
//!   HTTP API, reachable at the hostname through an alias record.
//! - [`app`]: resolves the hosted zone once and composes both stacks.

pub mod app;
pub mod certificate;
pub mod service;

pub use app::{compose, compose_with_image};
pub use certificate::{CertificateStack, IssuedCertificate};
pub use service::{ServiceStack, ServiceStackProps};
