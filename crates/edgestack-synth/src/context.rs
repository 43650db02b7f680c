//! Lookup context: values resolved outside the declaration graph.
//!
//! Hosted zone lookups are answered from a JSON context file so that
//! synthesis stays offline and deterministic. Entries are keyed the same
//! way the provisioning engine keys its own lookup cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::AwsEnvironment;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A hosted zone lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZoneQuery {
    domain_name: String,
    account: String,
    region: String,
}

impl HostedZoneQuery {
    /// Builds a query for `domain_name` in the environment of `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`EdgestackError::EnvironmentAgnostic`] if the account or
    /// region is unknown.
    pub fn new(domain_name: &str, env: &AwsEnvironment, scope: &str) -> Result<Self> {
        match (&env.account, &env.region) {
            (Some(account), Some(region)) => Ok(Self {
                domain_name: normalize_domain(domain_name),
                account: account.clone(),
                region: region.clone(),
            }),
            _ => Err(EdgestackError::EnvironmentAgnostic {
                stack: scope.to_owned(),
                operation: format!("hosted zone lookup for {domain_name}"),
            }),
        }
    }

    /// Domain being looked up, without a trailing dot.
    #[must_use]
    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    /// Context key of this query.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "hosted-zone:account={}:domainName={}:region={}",
            self.account, self.domain_name, self.region
        )
    }
}

/// Result of a hosted zone lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    /// Zone id, with or without the `/hostedzone/` prefix.
    #[serde(rename = "Id")]
    id: String,
    /// Zone apex, with or without a trailing dot.
    #[serde(rename = "Name")]
    name: String,
}

impl HostedZone {
    /// Creates a zone from its id and apex name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Bare zone id, e.g. `Z0123456789ABC`.
    #[must_use]
    pub fn zone_id(&self) -> &str {
        self.id.strip_prefix("/hostedzone/").unwrap_or(&self.id)
    }

    /// Zone apex without a trailing dot.
    #[must_use]
    pub fn zone_name(&self) -> &str {
        self.name.strip_suffix('.').unwrap_or(&self.name)
    }
}

/// Source of hosted zone lookup results.
pub trait HostedZoneProvider {
    /// Resolves the hosted zone that matches `query`.
    ///
    /// # Errors
    ///
    /// Returns [`EdgestackError::ZoneNotFound`] if no zone matches.
    fn lookup_hosted_zone(&self, query: &HostedZoneQuery) -> Result<HostedZone>;
}

/// Lookup results persisted in a JSON file.
#[derive(Debug, Clone, Default)]
pub struct ContextFile {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Value>,
}

impl ContextFile {
    /// Loads the context file at `path`. A missing file yields an empty context.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| EdgestackError::Io {
                path: path.clone(),
                source: e,
            })?;
            serde_json::from_str(&content)?
        } else {
            tracing::debug!(path = %path.display(), "context file absent, starting empty");
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    /// Creates a context that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Records a hosted zone lookup result.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone cannot be serialized.
    pub fn set_hosted_zone(&mut self, query: &HostedZoneQuery, zone: &HostedZone) -> Result<()> {
        let _ = self.entries.insert(query.key(), serde_json::to_value(zone)?);
        Ok(())
    }

    /// Returns the raw value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the context back to the file it was loaded from.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is in-memory or the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| EdgestackError::config("in-memory context has no backing file"))?;
        let mut content = serde_json::to_string_pretty(&self.entries)?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| EdgestackError::Io {
            path: path.clone(),
            source: e,
        })
    }
}

impl HostedZoneProvider for ContextFile {
    fn lookup_hosted_zone(&self, query: &HostedZoneQuery) -> Result<HostedZone> {
        let key = query.key();
        let not_found = || EdgestackError::ZoneNotFound {
            domain: query.domain_name().to_owned(),
            key: key.clone(),
        };
        let value = self.entries.get(&key).ok_or_else(not_found)?;
        let zone: HostedZone = serde_json::from_value(value.clone())?;
        if normalize_domain(zone.zone_name()) != query.domain_name() {
            return Err(not_found());
        }
        tracing::debug!(%key, zone_id = zone.zone_id(), "resolved hosted zone from context");
        Ok(zone)
    }
}

/// Fixed zones keyed by apex domain, independent of account and region.
#[derive(Debug, Clone, Default)]
pub struct StaticZones {
    zones: BTreeMap<String, HostedZone>,
}

impl StaticZones {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zone.
    #[must_use]
    pub fn with_zone(mut self, zone: HostedZone) -> Self {
        let _ = self.zones.insert(normalize_domain(zone.zone_name()), zone);
        self
    }
}

impl HostedZoneProvider for StaticZones {
    fn lookup_hosted_zone(&self, query: &HostedZoneQuery) -> Result<HostedZone> {
        self.zones
            .get(query.domain_name())
            .cloned()
            .ok_or_else(|| EdgestackError::ZoneNotFound {
                domain: query.domain_name().to_owned(),
                key: query.key(),
            })
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.strip_suffix('.').unwrap_or(domain).to_ascii_lowercase()
}
