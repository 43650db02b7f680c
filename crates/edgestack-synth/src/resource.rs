//! Low-level resource declarations.

use std::collections::BTreeSet;

use edgestack_common::types::LogicalId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::intrinsic;
use crate::logical_id::ConstructPath;

/// What the provisioning engine does with a resource on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    /// Delete the physical resource.
    Delete,
    /// Keep the physical resource.
    Retain,
    /// Snapshot, then delete.
    Snapshot,
}

/// A single typed resource with its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct CfnResource {
    resource_type: String,
    properties: Map<String, Value>,
    depends_on: BTreeSet<LogicalId>,
    removal_policy: Option<RemovalPolicy>,
}

impl CfnResource {
    /// Creates a resource of the given type with no properties.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: BTreeSet::new(),
            removal_policy: None,
        }
    }

    /// Replaces the properties. Non-object values are ignored.
    #[must_use]
    pub fn with_properties(mut self, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.properties = map;
        }
        self
    }

    /// Sets both the deletion and update-replace policy.
    #[must_use]
    pub const fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    /// Resource type, e.g. `AWS::EC2::VPC`.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns a property value.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns a property value for modification.
    pub fn property_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.properties.get_mut(key)
    }

    /// Sets a property value.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        let _ = self.properties.insert(key.into(), value);
    }

    /// Appends `value` to the list property `key`, creating the list if needed.
    pub fn push_property(&mut self, key: &str, value: Value) {
        match self.properties.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                let _ = self.properties.insert(key.to_owned(), Value::Array(vec![value]));
            }
        }
    }

    /// Declares an explicit dependency on another resource.
    pub fn add_dependency(&mut self, id: &LogicalId) {
        let _ = self.depends_on.insert(id.clone());
    }

    /// Explicit dependencies.
    #[must_use]
    pub const fn depends_on(&self) -> &BTreeSet<LogicalId> {
        &self.depends_on
    }

    /// Every logical id this resource points at, explicit or implicit.
    #[must_use]
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs = intrinsic::collect_references(&Value::Object(self.properties.clone()));
        refs.extend(self.depends_on.iter().map(ToString::to_string));
        refs
    }

    /// Renders the template fragment for this resource.
    #[must_use]
    pub fn render(&self, path: &ConstructPath) -> Value {
        let mut out = Map::new();
        let _ = out.insert("Type".into(), json!(self.resource_type));
        if !self.properties.is_empty() {
            let _ = out.insert("Properties".into(), Value::Object(self.properties.clone()));
        }
        if !self.depends_on.is_empty() {
            let deps: Vec<&str> = self.depends_on.iter().map(LogicalId::as_str).collect();
            let _ = out.insert("DependsOn".into(), json!(deps));
        }
        if let Some(policy) = self.removal_policy {
            let _ = out.insert("DeletionPolicy".into(), json!(policy));
            let _ = out.insert("UpdateReplacePolicy".into(), json!(policy));
        }
        let _ = out.insert(
            "Metadata".into(),
            json!({ "edgestack:path": path.to_string() }),
        );
        Value::Object(out)
    }
}
