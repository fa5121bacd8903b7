//! Folders - hierarchical RBAC for Kubernetes namespaces
//!
//! A cluster-scoped `FolderTree` arranges folders into a hierarchy. Folders
//! own namespaces and carry RoleBinding templates; a template marked
//! `propagate` also applies to every namespace below its folder. The operator
//! keeps the cluster's RoleBindings equal to what the tree implies.
//!
//! # Architecture
//!
//! - The controller derives the desired RoleBindings from a tree, diffs them
//!   against the live ones it manages and applies the difference.
//! - The admission webhook replays the same diff as the requesting user in
//!   dry-run mode, so nobody can grant through a FolderTree what they could
//!   not grant directly.
//!
//! # Modules
//!
//! - [`crd`] - The FolderTree custom resource
//! - [`rbac`] - Inheritance calculation and RoleBinding diffing
//! - [`controller`] - Reconciliation and RoleBinding execution
//! - [`webhook`] - Validating admission webhook
//! - [`config`] - Operator configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod rbac;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Field manager for every write the operator makes
pub const FIELD_MANAGER: &str = "foldertree-controller";
