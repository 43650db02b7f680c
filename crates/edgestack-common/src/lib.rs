//! # edgestack-common
//!
//! Shared types, error definitions, stage configuration and constants
//! used across the entire edgestack workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives that the synthesizer, the
//! constructs and the stacks build upon.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
