//! Service roles and their inline policies.

use edgestack_common::error::Result;
use edgestack_common::types::LogicalId;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

/// IAM policy language version.
const POLICY_VERSION: &str = "2012-10-17";

/// One `Allow` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    actions: Vec<String>,
    resources: Vec<Value>,
}

impl PolicyStatement {
    /// Allows `actions` on `resources`.
    #[must_use]
    pub fn allow<I, S>(actions: I, resources: Vec<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
        }
    }

    /// Allows `actions` on every resource.
    #[must_use]
    pub fn allow_all_resources<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::allow(actions, vec![json!("*")])
    }

    fn render(&self) -> Value {
        let action = match self.actions.as_slice() {
            [single] => json!(single),
            many => json!(many),
        };
        let resource = match self.resources.as_slice() {
            [single] => single.clone(),
            many => json!(many),
        };
        json!({ "Action": action, "Effect": "Allow", "Resource": resource })
    }
}

/// A role assumable by an AWS service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    path: ConstructPath,
    id: LogicalId,
    policy: Option<LogicalId>,
}

impl Role {
    /// Declares a role at `path` that `service` (e.g. `ecs-tasks.amazonaws.com`)
    /// may assume.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already used.
    pub fn new(stack: &mut Stack, path: &ConstructPath, service: &str) -> Result<Self> {
        let id = stack.add_resource(
            &path.child("Resource"),
            CfnResource::new("AWS::IAM::Role").with_properties(json!({
                "AssumeRolePolicyDocument": {
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": service },
                    }],
                    "Version": POLICY_VERSION,
                },
            })),
        )?;
        Ok(Self {
            path: path.clone(),
            id,
            policy: None,
        })
    }

    /// Logical id of the role.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// Logical id of the default policy, once a statement has been added.
    #[must_use]
    pub const fn policy(&self) -> Option<&LogicalId> {
        self.policy.as_ref()
    }

    /// `Fn::GetAtt Arn` of the role.
    #[must_use]
    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.id, "Arn")
    }

    /// Appends a statement to the role's default policy, declaring the
    /// policy on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy cannot be declared or found.
    pub fn add_to_policy(&mut self, stack: &mut Stack, statement: &PolicyStatement) -> Result<LogicalId> {
        let policy_id = match self.policy.clone() {
            Some(id) => id,
            None => {
                let policy_path = self.path.child("DefaultPolicy");
                let id = stack.add_resource(
                    &policy_path.child("Resource"),
                    CfnResource::new("AWS::IAM::Policy").with_properties(json!({
                        "PolicyDocument": { "Statement": [], "Version": POLICY_VERSION },
                        "Roles": [intrinsic::reference(&self.id)],
                    })),
                )?;
                stack
                    .resource_mut(&id)?
                    .set_property("PolicyName", json!(id.as_str()));
                self.policy = Some(id.clone());
                id
            }
        };
        if let Some(Value::Array(statements)) = stack
            .resource_mut(&policy_id)?
            .property_mut("PolicyDocument")
            .and_then(|doc| doc.get_mut("Statement"))
        {
            statements.push(statement.render());
        }
        Ok(policy_id)
    }
}
