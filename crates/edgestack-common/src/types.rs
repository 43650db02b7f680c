//! Domain primitive types used across the edgestack workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EdgestackError, Result};

/// Maximum length of a CloudFormation logical id.
pub const MAX_LOGICAL_ID_LENGTH: usize = 255;

/// Identifier of a resource, parameter or output inside a template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Creates a logical id, checking that it is alphanumeric.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty, too long, or contains
    /// characters other than ASCII letters and digits.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty()
            || id.len() > MAX_LOGICAL_ID_LENGTH
            || !id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(EdgestackError::config(format!("invalid logical id: \"{id}\"")));
        }
        Ok(Self(id))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully qualified DNS name without a trailing dot.
///
/// The same value names the certificate and the alias record, so it is
/// composed exactly once and cloned everywhere it is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Parses and validates a DNS name.
    ///
    /// # Errors
    ///
    /// Returns an error if any label is empty, longer than 63 characters,
    /// contains characters other than ASCII letters, digits and hyphens, or
    /// starts or ends with a hyphen, or if the whole name exceeds 253
    /// characters.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.strip_suffix('.').unwrap_or(&name);
        if trimmed.is_empty() || trimmed.len() > 253 {
            return Err(EdgestackError::config(format!("invalid hostname length: \"{name}\"")));
        }
        for label in trimmed.split('.') {
            validate_label(label).map_err(|reason| {
                EdgestackError::config(format!("invalid hostname \"{name}\": {reason}"))
            })?;
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Composes `${subdomain}.${stage}.${domain}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the composed name is not a valid hostname.
    pub fn compose(subdomain: &str, stage: &str, domain: &str) -> Result<Self> {
        Self::parse(format!("{subdomain}.{stage}.{domain}"))
    }

    /// Returns `true` if this name equals `zone` or lies underneath it.
    #[must_use]
    pub fn is_within(&self, zone: &str) -> bool {
        let zone = zone.strip_suffix('.').unwrap_or(zone).to_ascii_lowercase();
        let name = self.0.to_ascii_lowercase();
        name == zone || name.ends_with(&format!(".{zone}"))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_label(label: &str) -> std::result::Result<(), String> {
    if label.is_empty() {
        return Err("empty label".into());
    }
    if label.len() > 63 {
        return Err(format!("label \"{label}\" exceeds 63 characters"));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("label \"{label}\" contains invalid characters"));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(format!("label \"{label}\" starts or ends with a hyphen"));
    }
    Ok(())
}

/// Target account and region of a stack.
///
/// Either half may be unknown, in which case the stack is
/// environment-agnostic and resolved by the provisioning engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AwsEnvironment {
    /// Account id, if known.
    pub account: Option<String>,
    /// Region name, if known.
    pub region: Option<String>,
}

impl AwsEnvironment {
    /// Creates an environment from optional account and region values.
    #[must_use]
    pub fn new(account: Option<String>, region: Option<String>) -> Self {
        Self { account, region }
    }

    /// Returns `true` when both the account and the region are known.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        self.account.is_some() && self.region.is_some()
    }

    /// Renders the environment as an `aws://account/region` URI.
    #[must_use]
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region"),
        )
    }
}

impl fmt::Display for AwsEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_id_rejects_punctuation() {
        assert!(LogicalId::new("Vpc8378EB38").is_ok());
        assert!(LogicalId::new("Vpc/Subnet").is_err());
        assert!(LogicalId::new("").is_err());
    }

    #[test]
    fn hostname_compose_joins_labels() {
        let host = Hostname::compose("poc-fargate-ecs", "dev", "slippys.cool").expect("valid");
        assert_eq!(host.as_str(), "poc-fargate-ecs.dev.slippys.cool");
    }

    #[test]
    fn hostname_strips_trailing_dot() {
        let host = Hostname::parse("api.example.com.").expect("valid");
        assert_eq!(host.as_str(), "api.example.com");
    }

    #[test]
    fn hostname_rejects_bad_labels() {
        assert!(Hostname::compose("svc", "", "example.com").is_err());
        assert!(Hostname::compose("svc", "my stage", "example.com").is_err());
        assert!(Hostname::compose("svc", "-dev", "example.com").is_err());
        assert!(Hostname::parse("a".repeat(64) + ".com").is_err());
    }

    #[test]
    fn hostname_within_zone() {
        let host = Hostname::parse("poc.dev.slippys.cool").expect("valid");
        assert!(host.is_within("slippys.cool"));
        assert!(host.is_within("slippys.cool."));
        assert!(host.is_within("SLIPPYS.cool"));
        assert!(!host.is_within("ppys.cool"));
        assert!(!host.is_within("example.com"));
    }

    #[test]
    fn environment_uri_marks_unknown_parts() {
        let env = AwsEnvironment::new(Some("123456789012".into()), None);
        assert!(!env.is_concrete());
        assert_eq!(env.uri(), "aws://123456789012/unknown-region");
    }
}
