//! Stacks: the unit of deployment.
//!
//! A stack owns the resources declared under it, the parameters and outputs
//! of its template, and the record of every value it imports from another
//! stack. Imports are resolved into outputs on the producing side when the
//! app is synthesized, so a producer is never mutated by its consumers.

use std::collections::{BTreeMap, BTreeSet};

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::{AwsEnvironment, LogicalId};
use serde_json::Value;

use crate::asset::DockerImageAsset;
use crate::graph::DependencyGraph;
use crate::intrinsic;
use crate::logical_id::{self, ConstructPath};
use crate::resource::CfnResource;
use crate::template::{Output, Parameter, Template};
use crate::validator;

/// Maximum length of a stack name.
const MAX_STACK_NAME_LENGTH: usize = 128;

/// Deployment properties of a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackProps {
    /// Target account and region.
    pub env: AwsEnvironment,
    /// Allow references to and from stacks in other regions.
    pub cross_region_references: bool,
    /// Template description.
    pub description: Option<String>,
}

/// A resource together with the path it was declared under.
#[derive(Debug, Clone)]
pub(crate) struct ResourceEntry {
    pub(crate) path: ConstructPath,
    pub(crate) resource: CfnResource,
}

/// A property a construct expects to be populated before synthesis.
#[derive(Debug, Clone)]
pub(crate) struct RequiredProperty {
    pub(crate) resource: LogicalId,
    pub(crate) property: String,
    pub(crate) message: String,
}

/// A value produced by one stack for use in another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackReference {
    producer: String,
    env: AwsEnvironment,
    cross_region_references: bool,
    target: LogicalId,
    attribute: Option<String>,
}

impl StackReference {
    /// Name of the producing stack.
    #[must_use]
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Environment of the producing stack.
    #[must_use]
    pub const fn env(&self) -> &AwsEnvironment {
        &self.env
    }

    /// Referenced resource in the producing stack.
    #[must_use]
    pub const fn target(&self) -> &LogicalId {
        &self.target
    }

    /// Referenced attribute, or `None` for the resource's `Ref` value.
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Logical id of the producer output carrying this value.
    #[must_use]
    pub fn output_id(&self) -> String {
        match &self.attribute {
            Some(attr) => format!(
                "ExportsOutputFnGetAtt{}{}",
                self.target,
                logical_id::sanitize(attr)
            ),
            None => format!("ExportsOutputRef{}", self.target),
        }
    }

    /// Region-unique export name used for same-region imports.
    #[must_use]
    pub fn export_name(&self) -> String {
        format!("{}:{}", self.producer, self.output_id())
    }

    /// The value inside the producing stack.
    #[must_use]
    pub fn local_value(&self) -> Value {
        match &self.attribute {
            Some(attr) => intrinsic::get_att(&self.target, attr),
            None => intrinsic::reference(&self.target),
        }
    }
}

/// How an imported value reaches the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// `Fn::ImportValue` of a same-region export.
    Export {
        /// Export name.
        name: String,
    },
    /// A template parameter bound by the engine to the producer's output.
    Parameter {
        /// Parameter logical id in the consumer.
        name: String,
    },
}

/// A value a stack imports from another stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// The imported reference.
    pub reference: StackReference,
    /// Transport chosen for the reference.
    pub kind: ImportKind,
}

/// A named collection of resources deployed together.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    props: StackProps,
    resources: BTreeMap<LogicalId, ResourceEntry>,
    paths: BTreeSet<String>,
    parameters: BTreeMap<String, Parameter>,
    outputs: BTreeMap<String, Output>,
    required: Vec<RequiredProperty>,
    imports: Vec<ImportRecord>,
    assets: BTreeMap<String, DockerImageAsset>,
}

impl Stack {
    /// Creates an empty stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the name does not start with a letter, contains
    /// characters other than letters, digits and hyphens, or is longer than
    /// 128 characters.
    pub fn new(name: impl Into<String>, props: StackProps) -> Result<Self> {
        let name = name.into();
        let valid = name.len() <= MAX_STACK_NAME_LENGTH
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(EdgestackError::config(format!("invalid stack name: \"{name}\"")));
        }
        tracing::debug!(stack = %name, env = %props.env, "created stack");
        Ok(Self {
            name,
            props,
            resources: BTreeMap::new(),
            paths: BTreeSet::new(),
            parameters: BTreeMap::new(),
            outputs: BTreeMap::new(),
            required: Vec::new(),
            imports: Vec::new(),
            assets: BTreeMap::new(),
        })
    }

    /// Stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target environment.
    #[must_use]
    pub const fn env(&self) -> &AwsEnvironment {
        &self.props.env
    }

    /// Whether cross-region references are allowed.
    #[must_use]
    pub const fn cross_region_references(&self) -> bool {
        self.props.cross_region_references
    }

    /// Template description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.props.description.as_deref()
    }

    /// Declares a resource under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already used or yields an invalid
    /// or colliding logical id.
    pub fn add_resource(&mut self, path: &ConstructPath, resource: CfnResource) -> Result<LogicalId> {
        let rendered_path = path.to_string();
        let id = logical_id::allocate(path)?;
        if self.paths.contains(&rendered_path) || self.resources.contains_key(&id) {
            return Err(EdgestackError::DuplicateConstruct {
                stack: self.name.clone(),
                path: rendered_path,
            });
        }
        tracing::debug!(
            stack = %self.name,
            path = %rendered_path,
            logical_id = %id,
            resource_type = resource.resource_type(),
            "declared resource"
        );
        let _ = self.paths.insert(rendered_path);
        let _ = self.resources.insert(
            id.clone(),
            ResourceEntry {
                path: path.clone(),
                resource,
            },
        );
        Ok(id)
    }

    /// Returns a declared resource.
    #[must_use]
    pub fn resource(&self, id: &LogicalId) -> Option<&CfnResource> {
        self.resources.get(id).map(|e| &e.resource)
    }

    /// Returns a declared resource for modification.
    ///
    /// # Errors
    ///
    /// Returns [`EdgestackError::NotFound`] if no such resource exists.
    pub fn resource_mut(&mut self, id: &LogicalId) -> Result<&mut CfnResource> {
        let name = &self.name;
        self.resources
            .get_mut(id)
            .map(|e| &mut e.resource)
            .ok_or_else(|| EdgestackError::NotFound {
                kind: "resource",
                id: format!("{id} in stack {name}"),
            })
    }

    /// Returns the path a resource was declared under.
    #[must_use]
    pub fn path_of(&self, id: &LogicalId) -> Option<&ConstructPath> {
        self.resources.get(id).map(|e| &e.path)
    }

    /// Iterates over all resources in logical id order.
    pub fn resources(&self) -> impl Iterator<Item = (&LogicalId, &CfnResource)> {
        self.resources.iter().map(|(id, e)| (id, &e.resource))
    }

    /// Iterates over the ids of resources of one type.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a LogicalId> + 'a {
        self.resources
            .iter()
            .filter(move |(_, e)| e.resource.resource_type() == resource_type)
            .map(|(id, _)| id)
    }

    /// Declares a template output.
    ///
    /// # Errors
    ///
    /// Returns an error if an output with the same id exists.
    pub fn add_output(&mut self, id: &str, value: Value, description: Option<String>) -> Result<()> {
        let id = LogicalId::new(id)?;
        if self.outputs.contains_key(id.as_str()) {
            return Err(EdgestackError::DuplicateConstruct {
                stack: self.name.clone(),
                path: format!("Outputs/{id}"),
            });
        }
        let _ = self.outputs.insert(
            id.to_string(),
            Output {
                value,
                description,
                export: None,
            },
        );
        Ok(())
    }

    /// Registers a property that must be present and non-empty at synthesis.
    pub fn require_property(
        &mut self,
        resource: &LogicalId,
        property: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.required.push(RequiredProperty {
            resource: resource.clone(),
            property: property.into(),
            message: message.into(),
        });
    }

    /// Registers a docker image asset and returns its image URI.
    pub fn add_docker_image_asset(&mut self, asset: &DockerImageAsset) -> Value {
        let uri = asset.image_uri();
        let _ = self
            .assets
            .insert(asset.fingerprint().to_owned(), asset.clone());
        uri
    }

    /// Docker image assets keyed by fingerprint.
    #[must_use]
    pub const fn assets(&self) -> &BTreeMap<String, DockerImageAsset> {
        &self.assets
    }

    /// Exposes `target` (or one of its attributes) for other stacks.
    ///
    /// # Errors
    ///
    /// Returns [`EdgestackError::NotFound`] if the target is not in this stack.
    pub fn export_reference(&self, target: &LogicalId, attribute: Option<&str>) -> Result<StackReference> {
        if !self.resources.contains_key(target) {
            return Err(EdgestackError::NotFound {
                kind: "resource",
                id: format!("{target} in stack {}", self.name),
            });
        }
        Ok(StackReference {
            producer: self.name.clone(),
            env: self.props.env.clone(),
            cross_region_references: self.props.cross_region_references,
            target: target.clone(),
            attribute: attribute.map(ToOwned::to_owned),
        })
    }

    /// Imports a value produced by another stack and returns the expression
    /// to embed in this stack's properties.
    ///
    /// Same-environment references become `Fn::ImportValue`. References
    /// across regions become template parameters bound to the producer's
    /// output, and require cross-region references on both stacks.
    ///
    /// # Errors
    ///
    /// Returns [`EdgestackError::CrossEnvironmentReference`] if the two
    /// environments cannot be bridged.
    pub fn import(&mut self, reference: &StackReference) -> Result<Value> {
        if reference.producer == self.name {
            return Ok(reference.local_value());
        }
        if let Some(existing) = self.imports.iter().find(|r| &r.reference == reference) {
            return Ok(import_expression(&existing.kind));
        }

        let kind = if self.same_region_as(reference)? {
            ImportKind::Export {
                name: reference.export_name(),
            }
        } else {
            if !(self.props.cross_region_references && reference.cross_region_references) {
                return Err(self.reference_error(
                    reference,
                    "stacks are in different regions; enable cross-region references on both",
                ));
            }
            let name = format!(
                "{}{}",
                logical_id::sanitize(&reference.producer),
                reference.output_id()
            );
            let _ = self.parameters.insert(
                name.clone(),
                Parameter {
                    parameter_type: "String".into(),
                    description: Some(format!(
                        "{} from stack {}",
                        reference.output_id(),
                        reference.producer
                    )),
                },
            );
            ImportKind::Parameter { name }
        };

        tracing::debug!(
            consumer = %self.name,
            producer = %reference.producer,
            target = %reference.target,
            ?kind,
            "imported cross-stack reference"
        );
        let value = import_expression(&kind);
        self.imports.push(ImportRecord {
            reference: reference.clone(),
            kind,
        });
        Ok(value)
    }

    /// Values this stack imports from other stacks.
    #[must_use]
    pub fn imports(&self) -> &[ImportRecord] {
        &self.imports
    }

    /// Resource ids in dependency order.
    ///
    /// # Errors
    ///
    /// Returns an error if the resources form a cycle.
    pub fn resource_order(&self) -> Result<Vec<LogicalId>> {
        let mut graph = DependencyGraph::new();
        for (id, entry) in &self.resources {
            let _ = graph.add_node(id.as_str());
            for target in entry.resource.references() {
                if self.resources.keys().any(|k| k.as_str() == target) {
                    graph.add_dependency(id.as_str(), &target);
                }
            }
        }
        graph
            .resolve_order(&self.name)?
            .into_iter()
            .map(LogicalId::new)
            .collect()
    }

    /// Validates the stack and renders its template.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn to_template(&self) -> Result<Template> {
        validator::validate(self)?;
        let resources = self
            .resources
            .iter()
            .map(|(id, e)| (id.to_string(), e.resource.render(&e.path)))
            .collect();
        Ok(Template {
            format_version: edgestack_common::constants::TEMPLATE_FORMAT_VERSION.into(),
            description: self.props.description.clone(),
            parameters: self.parameters.clone(),
            resources,
            outputs: self.outputs.clone(),
        })
    }

    pub(crate) const fn entries(&self) -> &BTreeMap<LogicalId, ResourceEntry> {
        &self.resources
    }

    pub(crate) fn required_properties(&self) -> &[RequiredProperty] {
        &self.required
    }

    pub(crate) const fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    fn same_region_as(&self, reference: &StackReference) -> Result<bool> {
        let mine = &self.props.env;
        let theirs = &reference.env;
        match (&mine.account, &theirs.account) {
            (Some(a), Some(b)) if a != b => {
                return Err(self.reference_error(reference, "cross-account references are not supported"));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(self.reference_error(
                    reference,
                    "one stack has an explicit account and the other does not",
                ));
            }
            _ => {}
        }
        match (&mine.region, &theirs.region) {
            (Some(a), Some(b)) => Ok(a == b),
            (None, None) => Ok(true),
            _ => Err(self.reference_error(
                reference,
                "cross-stack references need an explicit region on both stacks",
            )),
        }
    }

    fn reference_error(&self, reference: &StackReference, reason: &str) -> EdgestackError {
        EdgestackError::CrossEnvironmentReference {
            producer: reference.producer.clone(),
            consumer: self.name.clone(),
            reason: reason.to_owned(),
        }
    }
}

fn import_expression(kind: &ImportKind) -> Value {
    match kind {
        ImportKind::Export { name } => intrinsic::import_value(name),
        ImportKind::Parameter { name } => serde_json::json!({ "Ref": name }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn env(account: &str, region: &str) -> AwsEnvironment {
        AwsEnvironment::new(Some(account.into()), Some(region.into()))
    }

    fn stack(name: &str, env: AwsEnvironment, cross_region: bool) -> Stack {
        Stack::new(
            name,
            StackProps {
                env,
                cross_region_references: cross_region,
                description: None,
            },
        )
        .expect("stack")
    }

    fn producer(region: &str, cross_region: bool) -> (Stack, StackReference) {
        let mut s = stack("Certificate-dev", env("111111111111", region), cross_region);
        let id = s
            .add_resource(
                &ConstructPath::root("Certificate"),
                CfnResource::new("AWS::CertificateManager::Certificate"),
            )
            .expect("resource");
        let reference = s.export_reference(&id, None).expect("reference");
        (s, reference)
    }

    #[test]
    fn invalid_stack_names_are_rejected() {
        assert!(Stack::new("RestAPIStack-dev", StackProps::default()).is_ok());
        assert!(Stack::new("1stack", StackProps::default()).is_err());
        assert!(Stack::new("my_stack", StackProps::default()).is_err());
        assert!(Stack::new("", StackProps::default()).is_err());
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut s = stack("S", AwsEnvironment::default(), false);
        let path = ConstructPath::root("Cluster");
        let _ = s
            .add_resource(&path, CfnResource::new("AWS::ECS::Cluster"))
            .expect("first");
        let err = s
            .add_resource(&path, CfnResource::new("AWS::ECS::Cluster"))
            .unwrap_err();
        assert!(matches!(err, EdgestackError::DuplicateConstruct { .. }));
    }

    #[test]
    fn export_reference_requires_known_target() {
        let s = stack("S", AwsEnvironment::default(), false);
        let ghost = LogicalId::new("Ghost").expect("id");
        assert!(s.export_reference(&ghost, None).is_err());
    }

    #[test]
    fn same_region_import_uses_export() {
        let (_, reference) = producer("us-east-1", false);
        let mut consumer = stack("RestAPIStack-dev", env("111111111111", "us-east-1"), false);
        let value = consumer.import(&reference).expect("import");
        assert_eq!(
            value,
            json!({"Fn::ImportValue": "Certificate-dev:ExportsOutputRefCertificate"})
        );
        assert!(matches!(consumer.imports()[0].kind, ImportKind::Export { .. }));
    }

    #[test]
    fn cross_region_import_uses_parameter() {
        let (_, reference) = producer("us-east-1", true);
        let mut consumer = stack("RestAPIStack-dev", env("111111111111", "eu-west-1"), true);
        let value = consumer.import(&reference).expect("import");
        let expected = "CertificatedevExportsOutputRefCertificate";
        assert_eq!(value, json!({ "Ref": expected }));
        assert!(consumer.parameters().contains_key(expected));
    }

    #[test]
    fn repeated_import_reuses_binding() {
        let (_, reference) = producer("us-east-1", true);
        let mut consumer = stack("RestAPIStack-dev", env("111111111111", "eu-west-1"), true);
        let first = consumer.import(&reference).expect("first");
        let second = consumer.import(&reference).expect("second");
        assert_eq!(first, second);
        assert_eq!(consumer.imports().len(), 1);
    }

    #[test]
    fn cross_region_import_requires_opt_in() {
        let (_, reference) = producer("us-east-1", false);
        let mut consumer = stack("RestAPIStack-dev", env("111111111111", "eu-west-1"), true);
        let err = consumer.import(&reference).unwrap_err();
        assert!(err.to_string().contains("cross-region"), "got: {err}");
    }

    #[test]
    fn cross_account_import_is_rejected() {
        let (_, reference) = producer("us-east-1", true);
        let mut consumer = stack("RestAPIStack-dev", env("222222222222", "us-east-1"), true);
        assert!(consumer.import(&reference).is_err());
    }

    #[test]
    fn region_agnostic_consumer_is_rejected() {
        let (_, reference) = producer("us-east-1", true);
        let mut consumer = stack(
            "RestAPIStack-dev",
            AwsEnvironment::new(Some("111111111111".into()), None),
            true,
        );
        assert!(consumer.import(&reference).is_err());
    }

    #[test]
    fn self_import_is_local() {
        let (mut s, reference) = producer("us-east-1", false);
        assert_eq!(s.import(&reference).expect("local"), json!({"Ref": "Certificate"}));
        assert!(s.imports().is_empty());
    }

    #[test]
    fn attribute_reference_names_output() {
        let (s, _) = producer("us-east-1", false);
        let id = LogicalId::new("Certificate").expect("id");
        let reference = s.export_reference(&id, Some("Arn")).expect("reference");
        assert_eq!(reference.output_id(), "ExportsOutputFnGetAttCertificateArn");
        assert_eq!(
            reference.local_value(),
            json!({"Fn::GetAtt": ["Certificate", "Arn"]})
        );
    }

    #[test]
    fn resource_order_follows_references() {
        let mut s = stack("S", AwsEnvironment::default(), false);
        let vpc = s
            .add_resource(&ConstructPath::root("Vpc"), CfnResource::new("AWS::EC2::VPC"))
            .expect("vpc");
        let subnet = s
            .add_resource(
                &ConstructPath::root("ASubnet"),
                CfnResource::new("AWS::EC2::Subnet")
                    .with_properties(json!({"VpcId": intrinsic::reference(&vpc)})),
            )
            .expect("subnet");
        let order = s.resource_order().expect("order");
        let pos = |id: &LogicalId| order.iter().position(|o| o == id).expect("present");
        assert!(pos(&vpc) < pos(&subnet));
    }

    #[test]
    fn path_of_returns_declaring_path() {
        let mut s = stack("S", AwsEnvironment::default(), false);
        let path = ConstructPath::root("Vpc").child("Resource");
        let id = s
            .add_resource(&path, CfnResource::new("AWS::EC2::VPC"))
            .expect("vpc");
        assert_eq!(s.path_of(&id), Some(&path));
        assert_eq!(s.path_of(&LogicalId::new("Missing").expect("id")), None);
    }

    #[test]
    fn outputs_must_be_unique() {
        let mut s = stack("S", AwsEnvironment::default(), false);
        s.add_output("Url", json!("x"), None).expect("first");
        assert!(s.add_output("Url", json!("y"), None).is_err());
    }
}
