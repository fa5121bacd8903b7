//! RoleBinding derivation for FolderTrees
//!
//! - [`binding`]: RoleBinding identity, tracking labels and builder
//! - [`calculation`]: inheritance walk producing the desired RoleBinding set
//! - [`diff`]: operations that turn a baseline into the desired set

pub mod binding;
pub mod calculation;
pub mod diff;

pub use binding::{
    binding_name, dry_run_binding_name, managed_selector, refreshed, template_of, tracking_labels,
    tree_selector, BindingBuilder, MANAGED_BY_LABEL, MANAGED_BY_VALUE, TEMPLATE_LABEL, TREE_LABEL,
};
pub use calculation::{calculate_desired_bindings, BindingKey, DesiredBinding, DesiredBindingSet};
pub use diff::{
    compute_cluster_diff, compute_spec_diff, needs_update, BindingOperation, OperationKind,
};
