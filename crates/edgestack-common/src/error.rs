//! Unified error type for the edgestack workspace.
//!
//! Every failure is raised synchronously while constructs are declared or
//! while the app is synthesized. Provisioning-time failures belong to the
//! external engine and never surface here.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum EdgestackError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required item was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing item.
        kind: &'static str,
        /// Identifier of the missing item.
        id: String,
    },

    /// Two constructs were declared under the same path.
    #[error("duplicate construct path in stack {stack}: {path}")]
    DuplicateConstruct {
        /// Stack holding the construct.
        stack: String,
        /// Offending construct path.
        path: String,
    },

    /// A resource references a logical id that does not exist.
    #[error("resource {from} in stack {stack} references unknown target {target}")]
    DanglingReference {
        /// Stack holding the resource.
        stack: String,
        /// Referencing resource.
        from: String,
        /// Missing target.
        target: String,
    },

    /// A property that a construct requires was never populated.
    #[error("resource {resource} in stack {stack} is missing {property}: {message}")]
    MissingProperty {
        /// Stack holding the resource.
        stack: String,
        /// Incomplete resource.
        resource: String,
        /// Name of the missing property.
        property: String,
        /// Hint describing how to populate it.
        message: String,
    },

    /// The dependency graph contains a cycle.
    #[error("cyclic dependency detected in {scope} involving {node}")]
    CyclicDependency {
        /// Stack name or `app` for the stack-level graph.
        scope: String,
        /// One node that participates in the cycle.
        node: String,
    },

    /// A reference crosses an environment boundary it is not allowed to cross.
    #[error("stack {consumer} cannot reference {producer}: {reason}")]
    CrossEnvironmentReference {
        /// Producing stack.
        producer: String,
        /// Consuming stack.
        consumer: String,
        /// Why the reference is rejected.
        reason: String,
    },

    /// No hosted zone matches a lookup.
    #[error("hosted zone not found for {domain} (context key {key})")]
    ZoneNotFound {
        /// Domain that was looked up.
        domain: String,
        /// Context key that was consulted.
        key: String,
    },

    /// An operation needs a concrete account and region.
    #[error("stack {stack} is environment-agnostic; {operation} requires an explicit account and region")]
    EnvironmentAgnostic {
        /// Stack (or scope) performing the operation.
        stack: String,
        /// Operation that needs an environment.
        operation: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl EdgestackError {
    /// Shorthand for a [`EdgestackError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, EdgestackError>;
