//! Construct paths and logical id allocation.
//!
//! A logical id is the human-readable concatenation of the path segments
//! followed by a short digest of the full path, so that two constructs with
//! similar names never collide and renaming a parent changes every id below it.

use std::fmt;

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::{LogicalId, MAX_LOGICAL_ID_LENGTH};
use sha2::{Digest, Sha256};

/// Length of the uppercase hex digest appended to nested ids.
const HASH_LENGTH: usize = 8;

/// Segments that carry no naming information.
const HIDDEN_SEGMENTS: &[&str] = &["Resource", "Default"];

/// Hierarchical path of a construct inside its stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstructPath {
    segments: Vec<String>,
}

impl ConstructPath {
    /// Creates a top-level path.
    #[must_use]
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            segments: vec![id.into()],
        }
    }

    /// Returns the path of a child construct.
    #[must_use]
    pub fn child(&self, id: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.into());
        Self { segments }
    }

    /// Returns the individual segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the last segment.
    #[must_use]
    pub fn id(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }
}

impl fmt::Display for ConstructPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Allocates the logical id of a construct path.
///
/// # Errors
///
/// Returns an error if a segment is empty or contains `/`, or if the path
/// yields no usable characters.
pub fn allocate(path: &ConstructPath) -> Result<LogicalId> {
    for segment in path.segments() {
        if segment.is_empty() || segment.contains('/') {
            return Err(EdgestackError::config(format!(
                "invalid construct id \"{segment}\" in path {path}"
            )));
        }
    }

    if let [only] = path.segments() {
        let human = sanitize(only);
        return LogicalId::new(truncate(&human, MAX_LOGICAL_ID_LENGTH));
    }

    let mut visible: Vec<&str> = Vec::new();
    for segment in path.segments() {
        if HIDDEN_SEGMENTS.contains(&segment.as_str()) {
            continue;
        }
        if visible.last() == Some(&segment.as_str()) {
            continue;
        }
        visible.push(segment);
    }

    let human: String = visible.iter().map(|s| sanitize(s)).collect();
    let human = truncate(&human, MAX_LOGICAL_ID_LENGTH - HASH_LENGTH);
    LogicalId::new(format!("{human}{}", path_hash(path)))
}

/// Strips every character that is not an ASCII letter or digit.
#[must_use]
pub fn sanitize(value: &str) -> String {
    value.chars().filter(char::is_ascii_alphanumeric).collect()
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn path_hash(path: &ConstructPath) -> String {
    let digest = Sha256::digest(path.to_string().as_bytes());
    let hex = format!("{digest:X}");
    hex[..HASH_LENGTH].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_is_used_verbatim() {
        let id = allocate(&ConstructPath::root("Certificate")).expect("valid");
        assert_eq!(id.as_str(), "Certificate");
    }

    #[test]
    fn single_segment_is_sanitized() {
        let id = allocate(&ConstructPath::root("Api-Alias_Record")).expect("valid");
        assert_eq!(id.as_str(), "ApiAliasRecord");
    }

    #[test]
    fn nested_path_appends_hash() {
        let path = ConstructPath::root("Vpc").child("PublicSubnet1").child("Subnet");
        let id = allocate(&path).expect("valid");
        assert!(id.as_str().starts_with("VpcPublicSubnet1Subnet"), "got {id}");
        assert_eq!(id.as_str().len(), "VpcPublicSubnet1Subnet".len() + HASH_LENGTH);
        assert!(id.as_str()[id.as_str().len() - HASH_LENGTH..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn hidden_segments_and_duplicates_are_dropped() {
        let path = ConstructPath::root("ALB").child("Resource");
        let id = allocate(&path).expect("valid");
        assert!(id.as_str().starts_with("ALB"));
        assert!(!id.as_str().contains("Resource"));

        let dup = ConstructPath::root("Cluster").child("Cluster");
        let id = allocate(&dup).expect("valid");
        assert_eq!(id.as_str().len(), "Cluster".len() + HASH_LENGTH);
    }

    #[test]
    fn allocation_is_stable_and_distinct() {
        let a = ConstructPath::root("Vpc").child("PublicSubnet1").child("Subnet");
        let b = ConstructPath::root("Vpc").child("PublicSubnet2").child("Subnet");
        assert_eq!(allocate(&a).expect("a"), allocate(&a).expect("a"));
        assert_ne!(allocate(&a).expect("a"), allocate(&b).expect("b"));
    }

    #[test]
    fn hash_distinguishes_paths_with_same_human_part() {
        let a = ConstructPath::root("Api").child("Resource");
        let b = ConstructPath::root("Api").child("Default");
        assert_ne!(allocate(&a).expect("a"), allocate(&b).expect("b"));
    }

    #[test]
    fn invalid_segments_are_rejected() {
        assert!(allocate(&ConstructPath::root("")).is_err());
        assert!(allocate(&ConstructPath::root("Vpc").child("a/b")).is_err());
        assert!(allocate(&ConstructPath::root("--")).is_err());
    }

    #[test]
    fn display_joins_with_slash() {
        let path = ConstructPath::root("TaskDef").child("MyContainer");
        assert_eq!(path.to_string(), "TaskDef/MyContainer");
        assert_eq!(path.id(), "MyContainer");
    }
}
