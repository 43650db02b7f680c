//! Apps and cloud assembly synthesis.
//!
//! An [`App`] is the root of the declaration graph. Synthesizing it resolves
//! every cross-stack import into producer outputs, validates and renders each
//! stack, orders the stacks for deployment, and produces a [`CloudAssembly`]
//! that the provisioning engine consumes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use edgestack_common::constants::{ASSEMBLY_VERSION, MANIFEST_FILE};
use edgestack_common::error::{EdgestackError, Result};
use serde::{Deserialize, Serialize};

use crate::asset::DockerImageAsset;
use crate::graph::DependencyGraph;
use crate::stack::{ImportKind, Stack};
use crate::template::{Export, Output, Template};

/// Artifact type of a deployable stack.
pub const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";

/// Root of the declaration graph.
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    /// Creates an empty app.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if a stack with the same name exists.
    pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
        if self.stack(stack.name()).is_some() {
            return Err(EdgestackError::DuplicateConstruct {
                stack: stack.name().to_owned(),
                path: "/".into(),
            });
        }
        tracing::debug!(stack = stack.name(), "added stack to app");
        self.stacks.push(stack);
        Ok(())
    }

    /// Returns a stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    /// All stacks in insertion order.
    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Synthesizes the cloud assembly.
    ///
    /// # Errors
    ///
    /// Returns an error if an import names a stack or resource missing from
    /// the app, if any stack fails validation, or if the stacks depend on
    /// each other cyclically.
    pub fn synth(&self) -> Result<CloudAssembly> {
        tracing::info!(stacks = self.stacks.len(), "synthesizing app");

        let mut graph = DependencyGraph::new();
        let mut exports: BTreeMap<String, BTreeMap<String, Output>> = BTreeMap::new();
        let mut bindings: BTreeMap<String, BTreeMap<String, ParameterBinding>> = BTreeMap::new();

        for stack in &self.stacks {
            let _ = graph.add_node(stack.name());
        }

        for consumer in &self.stacks {
            for record in consumer.imports() {
                let reference = &record.reference;
                let producer = self.stack(reference.producer()).ok_or_else(|| {
                    EdgestackError::NotFound {
                        kind: "stack",
                        id: format!(
                            "{} (imported by {})",
                            reference.producer(),
                            consumer.name()
                        ),
                    }
                })?;
                if producer.env() != reference.env() {
                    return Err(EdgestackError::config(format!(
                        "stack {} imports a reference from {} declared for {}, but the stack targets {}",
                        consumer.name(),
                        producer.name(),
                        reference.env(),
                        producer.env()
                    )));
                }
                if producer.resource(reference.target()).is_none() {
                    return Err(EdgestackError::NotFound {
                        kind: "resource",
                        id: format!("{} in stack {}", reference.target(), producer.name()),
                    });
                }

                let export = match &record.kind {
                    ImportKind::Export { name } => Some(Export { name: name.clone() }),
                    ImportKind::Parameter { name } => {
                        let _ = bindings.entry(consumer.name().to_owned()).or_default().insert(
                            name.clone(),
                            ParameterBinding {
                                stack: producer.name().to_owned(),
                                output: reference.output_id(),
                            },
                        );
                        None
                    }
                };
                let outputs = exports.entry(producer.name().to_owned()).or_default();
                let output = outputs.entry(reference.output_id()).or_insert_with(|| Output {
                    value: reference.local_value(),
                    description: None,
                    export: None,
                });
                if export.is_some() {
                    output.export = export;
                }
                graph.add_dependency(consumer.name(), producer.name());
            }
        }

        let order = graph.resolve_order("app")?;

        let mut templates = BTreeMap::new();
        let mut asset_manifests = BTreeMap::new();
        let mut artifacts = BTreeMap::new();
        for stack in &self.stacks {
            let mut template = stack.to_template()?;
            if let Some(extra) = exports.remove(stack.name()) {
                for (id, output) in extra {
                    if template.outputs.contains_key(&id) {
                        return Err(EdgestackError::DuplicateConstruct {
                            stack: stack.name().to_owned(),
                            path: format!("Outputs/{id}"),
                        });
                    }
                    let _ = template.outputs.insert(id, output);
                }
            }

            let asset_file = if stack.assets().is_empty() {
                None
            } else {
                let file = format!("{}.assets.json", stack.name());
                let _ = asset_manifests.insert(file.clone(), AssetManifest::for_stack(stack));
                Some(file)
            };

            let template_file = format!("{}.template.json", stack.name());
            let _ = artifacts.insert(
                stack.name().to_owned(),
                Artifact {
                    artifact_type: STACK_ARTIFACT_TYPE.into(),
                    environment: stack.env().uri(),
                    properties: ArtifactProperties {
                        template_file: template_file.clone(),
                        parameter_bindings: bindings.remove(stack.name()).unwrap_or_default(),
                        asset_manifest: asset_file,
                    },
                    dependencies: graph.dependencies_of(stack.name()),
                },
            );
            tracing::info!(
                stack = stack.name(),
                resources = template.resources.len(),
                outputs = template.outputs.len(),
                "rendered template"
            );
            let _ = templates.insert(template_file, template);
        }

        Ok(CloudAssembly {
            manifest: Manifest {
                version: ASSEMBLY_VERSION.into(),
                deployment_order: order,
                artifacts,
            },
            templates,
            asset_manifests,
        })
    }
}

/// Engine-resolved binding of a consumer parameter to a producer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBinding {
    /// Producing stack.
    pub stack: String,
    /// Output of the producing stack.
    pub output: String,
}

/// Properties of a stack artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    /// Template file inside the assembly directory.
    pub template_file: String,
    /// Parameters the engine fills from other stacks' outputs.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub parameter_bindings: BTreeMap<String, ParameterBinding>,
    /// Asset manifest file, if the stack has assets.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub asset_manifest: Option<String>,
}

/// One deployable stack in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Always [`STACK_ARTIFACT_TYPE`].
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// `aws://account/region` target.
    pub environment: String,
    /// Template and binding details.
    pub properties: ArtifactProperties,
    /// Stacks that must be deployed first.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dependencies: Vec<String>,
}

/// Assembly manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Assembly schema version.
    pub version: String,
    /// Stack names in deployment order.
    pub deployment_order: Vec<String>,
    /// Artifacts keyed by stack name.
    pub artifacts: BTreeMap<String, Artifact>,
}

/// Build source of a docker image asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerImageSource {
    /// Build context directory.
    pub directory: String,
}

/// Push destination of a docker image asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerImageDestination {
    /// Repository name, with pseudo-parameter placeholders.
    pub repository_name: String,
    /// Image tag.
    pub image_tag: String,
}

/// A docker image to build and push before deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerImageEntry {
    /// Build source.
    pub source: DockerImageSource,
    /// Push destination.
    pub destination: DockerImageDestination,
}

/// Assets of one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    /// Assembly schema version.
    pub version: String,
    /// Docker images keyed by fingerprint.
    pub docker_images: BTreeMap<String, DockerImageEntry>,
}

impl AssetManifest {
    fn for_stack(stack: &Stack) -> Self {
        let docker_images = stack
            .assets()
            .iter()
            .map(|(hash, asset)| (hash.clone(), docker_image_entry(asset)))
            .collect();
        Self {
            version: ASSEMBLY_VERSION.into(),
            docker_images,
        }
    }
}

fn docker_image_entry(asset: &DockerImageAsset) -> DockerImageEntry {
    DockerImageEntry {
        source: DockerImageSource {
            directory: asset.directory().display().to_string(),
        },
        destination: DockerImageDestination {
            repository_name: DockerImageAsset::repository_name(),
            image_tag: asset.fingerprint().to_owned(),
        },
    }
}

/// The synthesized output of an [`App`].
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    manifest: Manifest,
    templates: BTreeMap<String, Template>,
    asset_manifests: BTreeMap<String, AssetManifest>,
}

impl CloudAssembly {
    /// The assembly manifest.
    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The template of a stack.
    #[must_use]
    pub fn template(&self, stack: &str) -> Option<&Template> {
        self.templates.get(&format!("{stack}.template.json"))
    }

    /// Stack names in deployment order.
    #[must_use]
    pub fn deployment_order(&self) -> &[String] {
        &self.manifest.deployment_order
    }

    /// Renders every assembly file as pretty-printed JSON, keyed by file name.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn files(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let _ = files.insert(MANIFEST_FILE.to_owned(), render(&self.manifest)?);
        for (name, template) in &self.templates {
            let _ = files.insert(name.clone(), render(template)?);
        }
        for (name, assets) in &self.asset_manifests {
            let _ = files.insert(name.clone(), render(assets)?);
        }
        Ok(files)
    }

    /// Writes the assembly into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or any file cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| EdgestackError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let mut written = Vec::new();
        for (name, content) in self.files()? {
            let path = dir.join(name);
            std::fs::write(&path, content).map_err(|e| EdgestackError::Io {
                path: path.clone(),
                source: e,
            })?;
            tracing::debug!(path = %path.display(), "wrote assembly file");
            written.push(path);
        }
        tracing::info!(dir = %dir.display(), files = written.len(), "wrote cloud assembly");
        Ok(written)
    }
}

fn render<T: Serialize>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use edgestack_common::types::AwsEnvironment;
    use serde_json::json;

    use super::*;
    use crate::logical_id::ConstructPath;
    use crate::resource::CfnResource;
    use crate::stack::StackProps;

    fn props(region: &str, cross_region: bool) -> StackProps {
        StackProps {
            env: AwsEnvironment::new(Some("111111111111".into()), Some(region.into())),
            cross_region_references: cross_region,
            description: None,
        }
    }

    fn producer_and_consumer(consumer_region: &str) -> (Stack, Stack) {
        let mut producer = Stack::new("Producer", props("us-east-1", true)).expect("producer");
        let topic = producer
            .add_resource(&ConstructPath::root("Topic"), CfnResource::new("AWS::SNS::Topic"))
            .expect("topic");
        let reference = producer.export_reference(&topic, None).expect("reference");

        let mut consumer = Stack::new("Consumer", props(consumer_region, true)).expect("consumer");
        let value = consumer.import(&reference).expect("import");
        let _ = consumer
            .add_resource(
                &ConstructPath::root("Queue"),
                CfnResource::new("AWS::SQS::Queue").with_properties(json!({"Topic": value})),
            )
            .expect("queue");
        (producer, consumer)
    }

    #[test]
    fn duplicate_stack_names_are_rejected() {
        let mut app = App::new();
        app.add_stack(Stack::new("A", StackProps::default()).expect("a"))
            .expect("first");
        assert!(app.add_stack(Stack::new("A", StackProps::default()).expect("a")).is_err());
    }

    #[test]
    fn same_region_import_adds_export_output() {
        let (producer, consumer) = producer_and_consumer("us-east-1");
        let mut app = App::new();
        app.add_stack(consumer).expect("consumer");
        app.add_stack(producer).expect("producer");
        let assembly = app.synth().expect("synth");

        assert_eq!(assembly.deployment_order(), ["Producer", "Consumer"]);
        let producer = assembly.template("Producer").expect("template");
        let output = &producer.outputs["ExportsOutputRefTopic"];
        assert_eq!(output.value, json!({"Ref": "Topic"}));
        assert_eq!(
            output.export.as_ref().map(|e| e.name.as_str()),
            Some("Producer:ExportsOutputRefTopic")
        );
        let consumer = &assembly.manifest().artifacts["Consumer"];
        assert_eq!(consumer.dependencies, vec!["Producer"]);
        assert!(consumer.properties.parameter_bindings.is_empty());
    }

    #[test]
    fn cross_region_import_adds_parameter_binding() {
        let (producer, consumer) = producer_and_consumer("eu-west-1");
        let mut app = App::new();
        app.add_stack(producer).expect("producer");
        app.add_stack(consumer).expect("consumer");
        let assembly = app.synth().expect("synth");

        let binding = &assembly.manifest().artifacts["Consumer"]
            .properties
            .parameter_bindings["ProducerExportsOutputRefTopic"];
        assert_eq!(binding.stack, "Producer");
        assert_eq!(binding.output, "ExportsOutputRefTopic");
        let output = &assembly.template("Producer").expect("template").outputs["ExportsOutputRefTopic"];
        assert!(output.export.is_none());
    }

    #[test]
    fn import_from_missing_stack_fails() {
        let (_, consumer) = producer_and_consumer("us-east-1");
        let mut app = App::new();
        app.add_stack(consumer).expect("consumer");
        let err = app.synth().unwrap_err();
        assert!(err.to_string().contains("Producer"), "got: {err}");
    }

    #[test]
    fn files_are_deterministic() {
        let build = || {
            let (producer, consumer) = producer_and_consumer("eu-west-1");
            let mut app = App::new();
            app.add_stack(producer).expect("producer");
            app.add_stack(consumer).expect("consumer");
            app.synth().expect("synth").files().expect("files")
        };
        let first = build();
        assert_eq!(first, build());
        assert!(first.contains_key("manifest.json"));
        assert!(first.contains_key("Producer.template.json"));
        assert!(first.contains_key("Consumer.template.json"));
    }

    #[test]
    fn write_to_creates_files() {
        let (producer, consumer) = producer_and_consumer("us-east-1");
        let mut app = App::new();
        app.add_stack(producer).expect("producer");
        app.add_stack(consumer).expect("consumer");
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("assembly");
        let written = app.synth().expect("synth").write_to(&out).expect("write");
        assert_eq!(written.len(), 3);
        let manifest: Manifest = serde_json::from_str(
            &std::fs::read_to_string(out.join("manifest.json")).expect("read"),
        )
        .expect("parse");
        assert_eq!(manifest.artifacts["Consumer"].environment, "aws://111111111111/us-east-1");
    }
}
