//! Custom Resource Definitions for folders
//!
//! The FolderTree CRD is the single input of the operator.

mod folder_tree;
mod types;

pub use folder_tree::{
    Folder, FolderTree, FolderTreeSpec, FolderTreeStatus, RoleBindingTemplate, RoleRef, Subject,
    TreeNode, RBAC_API_GROUP,
};
pub use types::{
    set_condition, Condition, ConditionStatus, CONDITION_PROCESSING_FAILED, CONDITION_READY,
};
