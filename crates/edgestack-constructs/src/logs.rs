//! Log groups.

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::LogicalId;
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::{CfnResource, RemovalPolicy};
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

/// Retention periods CloudWatch Logs accepts, in days.
const RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// A CloudWatch log group. Kept when the stack is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogGroup {
    id: LogicalId,
}

impl LogGroup {
    /// Declares a log group at `path`. `None` keeps logs forever.
    ///
    /// # Errors
    ///
    /// Returns an error if the retention period is not one CloudWatch
    /// accepts or the path is already used.
    pub fn new(stack: &mut Stack, path: &ConstructPath, retention_days: Option<u32>) -> Result<Self> {
        let mut resource = CfnResource::new("AWS::Logs::LogGroup").with_removal_policy(RemovalPolicy::Retain);
        if let Some(days) = retention_days {
            if !RETENTION_DAYS.contains(&days) {
                return Err(EdgestackError::config(format!(
                    "log retention of {days} days is not supported"
                )));
            }
            resource.set_property("RetentionInDays", json!(days));
        }
        let id = stack.add_resource(&path.child("Resource"), resource)?;
        Ok(Self { id })
    }

    /// Logical id of the log group.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the log group, i.e. its name.
    #[must_use]
    pub fn log_group_name(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// `Fn::GetAtt Arn` of the log group.
    #[must_use]
    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.id, "Arn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn log_group_is_retained() {
        let mut stack = testing::stack();
        let group = LogGroup::new(&mut stack, &ConstructPath::root("Logs"), None).expect("group");
        let rendered = stack
            .resource(group.logical_id())
            .expect("resource")
            .render(&ConstructPath::root("Logs"));
        assert_eq!(rendered["DeletionPolicy"], "Retain");
        assert!(rendered.get("Properties").is_none());
    }

    #[test]
    fn retention_must_be_supported() {
        let mut stack = testing::stack();
        let group = LogGroup::new(&mut stack, &ConstructPath::root("Week"), Some(7)).expect("7 days");
        assert_eq!(
            stack.resource(group.logical_id()).and_then(|r| r.property("RetentionInDays")),
            Some(&json!(7))
        );
        assert!(LogGroup::new(&mut stack, &ConstructPath::root("Odd"), Some(8)).is_err());
    }
}
