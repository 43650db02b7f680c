//! Stage configuration threaded through every unit constructor.
//!
//! The process environment is read exactly once, at the entrypoint, into an
//! immutable [`StageContext`]. Constructs never consult ambient state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::Result;
use crate::types::{AwsEnvironment, Hostname};

/// Deployment parameters shared by the certificate and service units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContext {
    stage: String,
    domain_name: String,
    subdomain: String,
    hostname: Hostname,
    account: Option<String>,
    region: Option<String>,
    certificate_region: String,
    build_context: PathBuf,
    #[serde(default)]
    asset_excludes: Vec<PathBuf>,
}

impl StageContext {
    /// Creates a context for `stage` with the fixed domain literals.
    ///
    /// # Errors
    ///
    /// Returns an error if the composed hostname is not a valid DNS name.
    pub fn new(stage: impl Into<String>) -> Result<Self> {
        Self::with_domain(stage, constants::SUBDOMAIN, constants::DOMAIN_NAME)
    }

    /// Creates a context with an explicit subdomain and apex domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the composed hostname is not a valid DNS name.
    pub fn with_domain(
        stage: impl Into<String>,
        subdomain: impl Into<String>,
        domain_name: impl Into<String>,
    ) -> Result<Self> {
        let stage = stage.into();
        let subdomain = subdomain.into();
        let domain_name = domain_name.into();
        let hostname = Hostname::compose(&subdomain, &stage, &domain_name)?;
        Ok(Self {
            stage,
            domain_name,
            subdomain,
            hostname,
            account: None,
            region: None,
            certificate_region: constants::CERTIFICATE_REGION.to_owned(),
            build_context: PathBuf::from("."),
            asset_excludes: Vec::new(),
        })
    }

    /// Reads the context from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting hostname is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the context through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset, so `STAGE=""` selects the
    /// default stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting hostname is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let stage = read(constants::STAGE_ENV).unwrap_or_else(|| constants::DEFAULT_STAGE.into());
        let mut ctx = Self::new(stage)?;
        ctx.account = read(constants::ACCOUNT_ENV);
        ctx.region = read(constants::REGION_ENV);
        Ok(ctx)
    }

    /// Replaces the stage, recomposing the hostname.
    ///
    /// # Errors
    ///
    /// Returns an error if the new hostname is invalid.
    pub fn with_stage(mut self, stage: impl Into<String>) -> Result<Self> {
        let stage = stage.into();
        self.hostname = Hostname::compose(&self.subdomain, &stage, &self.domain_name)?;
        self.stage = stage;
        Ok(self)
    }

    /// Sets the target account.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Sets the region of the service stack.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the region of the certificate stack.
    #[must_use]
    pub fn with_certificate_region(mut self, region: impl Into<String>) -> Self {
        self.certificate_region = region.into();
        self
    }

    /// Sets the docker build context of the service container.
    #[must_use]
    pub fn with_build_context(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_context = path.into();
        self
    }

    /// Keeps `path` out of the build context fingerprint.
    ///
    /// Used for files the synthesizer itself writes, such as a custom
    /// output directory or lookup context file, so that writing them does
    /// not change the next image tag.
    #[must_use]
    pub fn with_asset_exclude(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !self.asset_excludes.contains(&path) {
            self.asset_excludes.push(path);
        }
        self
    }

    /// Deployment stage (`dev`, `prod`, ...).
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Apex domain owning the hosted zone.
    #[must_use]
    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    /// Leftmost label of the public hostname.
    #[must_use]
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// The public hostname `${subdomain}.${stage}.${domain_name}`.
    #[must_use]
    pub const fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    /// Target account, if known.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Region of the service stack, if known.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Region of the certificate stack.
    #[must_use]
    pub fn certificate_region(&self) -> &str {
        &self.certificate_region
    }

    /// Docker build context of the service container.
    #[must_use]
    pub fn build_context(&self) -> &Path {
        &self.build_context
    }

    /// Paths kept out of the build context fingerprint.
    #[must_use]
    pub fn asset_excludes(&self) -> &[PathBuf] {
        &self.asset_excludes
    }

    /// Environment of the certificate stack.
    #[must_use]
    pub fn certificate_env(&self) -> AwsEnvironment {
        AwsEnvironment::new(self.account.clone(), Some(self.certificate_region.clone()))
    }

    /// Environment of the service stack.
    #[must_use]
    pub fn service_env(&self) -> AwsEnvironment {
        AwsEnvironment::new(self.account.clone(), self.region.clone())
    }
}
