//! Static validation of a stack before its template is rendered.
//!
//! Checks for empty stacks, references to undeclared resources, required
//! properties left unset, and dependency cycles.

use std::collections::HashSet;

use edgestack_common::error::{EdgestackError, Result};
use serde_json::Value;

use crate::stack::Stack;

/// Validates a stack for semantic correctness.
///
/// # Checks performed
///
/// 1. The stack declares at least one resource.
/// 2. Every `Ref`, `Fn::GetAtt` and `DependsOn` target is a declared
///    resource or template parameter.
/// 3. Every property registered with [`Stack::require_property`] is present
///    and not an empty list, object or string.
/// 4. The resources do not depend on each other cyclically.
///
/// # Errors
///
/// Returns an error if any check fails.
pub fn validate(stack: &Stack) -> Result<()> {
    tracing::debug!(stack = stack.name(), "validating stack");
    check_not_empty(stack)?;
    check_references(stack)?;
    check_required_properties(stack)?;
    let _ = stack.resource_order()?;
    Ok(())
}

fn check_not_empty(stack: &Stack) -> Result<()> {
    if stack.entries().is_empty() {
        return Err(EdgestackError::config(format!(
            "stack {} declares no resources",
            stack.name()
        )));
    }
    Ok(())
}

fn check_references(stack: &Stack) -> Result<()> {
    let known: HashSet<&str> = stack
        .entries()
        .keys()
        .map(|id| id.as_str())
        .chain(stack.parameters().keys().map(String::as_str))
        .collect();

    for (id, entry) in stack.entries() {
        for target in entry.resource.references() {
            if !known.contains(target.as_str()) {
                return Err(EdgestackError::DanglingReference {
                    stack: stack.name().to_owned(),
                    from: id.to_string(),
                    target,
                });
            }
        }
    }
    Ok(())
}

fn check_required_properties(stack: &Stack) -> Result<()> {
    for required in stack.required_properties() {
        let present = stack
            .resource(&required.resource)
            .and_then(|r| r.property(&required.property))
            .is_some_and(|v| !is_empty_value(v));
        if !present {
            return Err(EdgestackError::MissingProperty {
                stack: stack.name().to_owned(),
                resource: required.resource.to_string(),
                property: required.property.clone(),
                message: required.message.clone(),
            });
        }
    }
    Ok(())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
