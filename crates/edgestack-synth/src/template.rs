//! Synthesized template model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A template input parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    /// Parameter type, e.g. `String`.
    #[serde(rename = "Type")]
    pub parameter_type: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

/// Export block of an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    /// Region-unique export name.
    pub name: String,
}

/// A template output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Output value.
    pub value: Value,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Export declaration for same-region consumers.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub export: Option<Export>,
}

/// A complete CloudFormation-style template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Always `2010-09-09`.
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    /// Stack description.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Input parameters.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub parameters: BTreeMap<String, Parameter>,
    /// Rendered resources keyed by logical id.
    pub resources: BTreeMap<String, Value>,
    /// Outputs keyed by logical id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    /// Returns a rendered resource by logical id.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&Value> {
        self.resources.get(id)
    }

    /// Returns every resource of the given type, in logical id order.
    #[must_use]
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&str, &Value)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.get("Type").and_then(Value::as_str) == Some(resource_type))
            .map(|(id, r)| (id.as_str(), r))
            .collect()
    }

    /// Returns the single resource of the given type, if exactly one exists.
    #[must_use]
    pub fn single_resource_of_type(&self, resource_type: &str) -> Option<(&str, &Value)> {
        match self.resources_of_type(resource_type).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}
