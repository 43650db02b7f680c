//! Container image sources.

use std::path::{Path, PathBuf};

use edgestack_common::error::Result;
use edgestack_synth::asset::DockerImageAsset;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

/// Where a container's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerImage {
    /// Built from a local directory and pushed to the bootstrap repository.
    Asset(DockerImageAsset),
    /// Pulled from a public registry by name.
    Registry(String),
}

impl ContainerImage {
    /// Builds the image from the `Dockerfile` in `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory has no `Dockerfile` or cannot be read.
    pub fn from_asset(directory: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::Asset(DockerImageAsset::from_directory(directory)?))
    }

    /// Builds the image from `directory`, leaving `excludes` out of its
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory has no `Dockerfile` or cannot be read.
    pub fn from_asset_excluding(directory: impl AsRef<Path>, excludes: &[PathBuf]) -> Result<Self> {
        Ok(Self::Asset(DockerImageAsset::from_directory_with_excludes(
            directory, excludes,
        )?))
    }

    /// Uses a published image such as `nginx:1.27`.
    #[must_use]
    pub fn from_registry(name: impl Into<String>) -> Self {
        Self::Registry(name.into())
    }

    /// Whether the image lives in the account's ECR repository.
    #[must_use]
    pub const fn is_asset(&self) -> bool {
        matches!(self, Self::Asset(_))
    }

    /// Registers the image with `stack` and returns the image reference.
    pub(crate) fn bind(&self, stack: &mut Stack) -> Value {
        match self {
            Self::Asset(asset) => stack.add_docker_image_asset(asset),
            Self::Registry(name) => json!(name),
        }
    }
}
