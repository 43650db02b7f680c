//! # edgestack-synth
//!
//! Declaration graph engine behind every edgestack stack.
//!
//! Handles:
//! - **Logical ids**: Construct paths and stable, hashed template identifiers.
//! - **Intrinsics**: `Ref`, `Fn::GetAtt`, `Fn::Sub` and friends, plus reference discovery.
//! - **Stack**: Resources, parameters, outputs and cross-stack references.
//! - **Validator**: Dangling references, missing properties and cycles.
//! - **Graph**: Dependency ordering of resources and stacks.
//! - **Asset**: Docker build context fingerprinting.
//! - **Context**: Hosted zone lookups backed by a context file.
//! - **App**: Synthesis of a deterministic cloud assembly.

pub mod app;
pub mod asset;
pub mod context;
pub mod graph;
pub mod intrinsic;
pub mod logical_id;
pub mod resource;
pub mod stack;
pub mod template;
pub mod validator;
