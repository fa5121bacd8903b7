//! FolderTree controller
//!
//! - [`client`]: Kubernetes API seam, mockable in tests
//! - [`executor`]: applies RoleBinding operations
//! - [`folder_tree`]: reconcile loop, status and error policy
//! - [`runner`]: wires watches into a kube-runtime `Controller`

pub mod client;
pub mod executor;
pub mod folder_tree;
pub mod runner;

pub use client::{FolderTreeKubeClient, FolderTreeKubeClientImpl};
pub use executor::{ExecutionSummary, GrantExecutor};
pub use folder_tree::{error_policy, reconcile, Context};
pub use runner::build_folder_tree_controller;
