//! CloudFormation intrinsic functions and reference discovery.

use std::collections::BTreeSet;

use edgestack_common::types::LogicalId;
use serde_json::{Value, json};

/// Pseudo parameters resolved by the provisioning engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    /// `AWS::AccountId`
    AccountId,
    /// `AWS::Region`
    Region,
    /// `AWS::Partition`
    Partition,
    /// `AWS::URLSuffix`
    UrlSuffix,
    /// `AWS::StackName`
    StackName,
}

impl Pseudo {
    /// Returns the parameter name as written in a template.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccountId => "AWS::AccountId",
            Self::Region => "AWS::Region",
            Self::Partition => "AWS::Partition",
            Self::UrlSuffix => "AWS::URLSuffix",
            Self::StackName => "AWS::StackName",
        }
    }
}

/// `{"Ref": id}`
#[must_use]
pub fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id.as_str() })
}

/// `{"Ref": "AWS::..."}`
#[must_use]
pub fn pseudo(parameter: Pseudo) -> Value {
    json!({ "Ref": parameter.as_str() })
}

/// `{"Fn::GetAtt": [id, attribute]}`
#[must_use]
pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

/// `{"Fn::Join": [delimiter, parts]}`
#[must_use]
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `{"Fn::Select": [index, list]}`
#[must_use]
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{"Fn::GetAZs": ""}`, the availability zones of the stack region.
#[must_use]
pub fn get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

/// `{"Fn::Sub": template}`
#[must_use]
pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// `{"Fn::ImportValue": name}`
#[must_use]
pub fn import_value(name: &str) -> Value {
    json!({ "Fn::ImportValue": name })
}

/// Collects every logical id referenced by `value`.
///
/// Pseudo parameters (`AWS::*`) are skipped. Targets of `Ref`,
/// `Fn::GetAtt` (list and dotted forms) and `${...}` placeholders inside
/// `Fn::Sub` are returned.
#[must_use]
pub fn collect_references(value: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk(value, &mut out);
    out
}

fn walk(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
        Value::Object(map) if map.len() == 1 => {
            if let Some(Value::String(target)) = map.get("Ref") {
                insert_target(target, out);
            } else if let Some(att) = map.get("Fn::GetAtt") {
                match att {
                    Value::Array(parts) => {
                        if let Some(Value::String(target)) = parts.first() {
                            insert_target(target, out);
                        }
                    }
                    Value::String(dotted) => {
                        insert_target(dotted.split('.').next().unwrap_or_default(), out);
                    }
                    _ => {}
                }
            } else if let Some(sub_args) = map.get("Fn::Sub") {
                walk_sub(sub_args, out);
            } else {
                map.values().for_each(|v| walk(v, out));
            }
        }
        Value::Object(map) => map.values().for_each(|v| walk(v, out)),
        _ => {}
    }
}

fn walk_sub(args: &Value, out: &mut BTreeSet<String>) {
    match args {
        Value::String(template) => scan_placeholders(template, &BTreeSet::new(), out),
        Value::Array(parts) => {
            let mut local = BTreeSet::new();
            if let Some(Value::Object(vars)) = parts.get(1) {
                local.extend(vars.keys().cloned());
                vars.values().for_each(|v| walk(v, out));
            }
            if let Some(Value::String(template)) = parts.first() {
                scan_placeholders(template, &local, out);
            }
        }
        _ => {}
    }
}

fn scan_placeholders(template: &str, local: &BTreeSet<String>, out: &mut BTreeSet<String>) {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.starts_with('!') {
            let target = name.split('.').next().unwrap_or_default();
            if !local.contains(target) {
                insert_target(target, out);
            }
        }
        rest = &after[end + 1..];
    }
}

fn insert_target(target: &str, out: &mut BTreeSet<String>) {
    if !target.is_empty() && !target.contains("::") {
        let _ = out.insert(target.to_owned());
    }
}
