//! Integration tests for the folders operator
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! cluster administrators organise namespaces with FolderTrees.
//!
//! # Test Organization
//!
//! - `folder_tree_lifecycle`: Stories about the controller turning a
//!   FolderTree into RoleBindings and keeping them in line as the tree, its
//!   namespaces and the bindings themselves change
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//! ```

mod folder_tree_lifecycle;
mod helpers;
