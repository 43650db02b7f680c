//! ECS clusters.

use edgestack_common::error::Result;
use edgestack_common::types::LogicalId;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::Value;

use crate::ec2::Vpc;

/// A cluster bound to the VPC its services run in.
#[derive(Debug, Clone)]
pub struct Cluster {
    id: LogicalId,
    vpc: Vpc,
}

impl Cluster {
    /// Declares a cluster under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already used.
    pub fn new(stack: &mut Stack, id: &str, vpc: &Vpc) -> Result<Self> {
        let logical_id = stack.add_resource(
            &ConstructPath::root(id).child("Resource"),
            CfnResource::new("AWS::ECS::Cluster"),
        )?;
        tracing::debug!(cluster = %logical_id, vpc = %vpc.logical_id(), "declared cluster");
        Ok(Self {
            id: logical_id,
            vpc: vpc.clone(),
        })
    }

    /// Logical id of the cluster.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the cluster, i.e. its name.
    #[must_use]
    pub fn cluster_name(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// `Fn::GetAtt Arn` of the cluster.
    #[must_use]
    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.id, "Arn")
    }

    /// The VPC services of this cluster run in.
    #[must_use]
    pub const fn vpc(&self) -> &Vpc {
        &self.vpc
    }
}
