//! RoleBinding identity, tracking labels and construction

use std::collections::BTreeMap;

use k8s_openapi::api::rbac::v1::{RoleBinding, Subject as RbacSubject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::crd::{FolderTree, RoleBindingTemplate};

/// Label marking RoleBindings this operator manages
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "foldertree-controller";
/// Label carrying the owning FolderTree name
pub const TREE_LABEL: &str = "foldertree.rbac.kubevirt.io/tree";
/// Label carrying the originating template name
pub const TEMPLATE_LABEL: &str = "foldertree.rbac.kubevirt.io/role-binding-template";

/// Name of the RoleBinding a template produces in every namespace
///
/// Independent of tree position, so renaming the tree or the template is an
/// identity change.
pub fn binding_name(tree: &str, template: &str) -> String {
    format!("foldertree-{tree}-{template}")
}

/// Name used for impersonated dry-run creates
///
/// The timestamp keeps it clear of the real binding.
pub fn dry_run_binding_name(tree: &str, template: &str, unix_nanos: i64) -> String {
    format!("dryrun-foldertree-{tree}-{template}-{unix_nanos}")
}

/// Tracking labels for a tree/template pair
pub fn tracking_labels(tree: &str, template: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (TREE_LABEL.to_string(), tree.to_string()),
        (TEMPLATE_LABEL.to_string(), template.to_string()),
    ])
}

/// Label selector for every RoleBinding of one tree
pub fn tree_selector(tree: &str) -> String {
    format!("{TREE_LABEL}={tree}")
}

/// Label selector for every RoleBinding this operator manages
pub fn managed_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}")
}

/// Template name recorded on a live RoleBinding
pub fn template_of(binding: &RoleBinding) -> Option<&str> {
    binding.labels().get(TEMPLATE_LABEL).map(String::as_str)
}

/// Builds RoleBindings for one FolderTree
///
/// The controller attaches a controller owner reference so garbage
/// collection removes bindings with their tree. Admission builds without one.
#[derive(Clone, Debug)]
pub struct BindingBuilder {
    tree: String,
    owner: Option<OwnerReference>,
}

impl BindingBuilder {
    /// Builder that sets a controller owner reference to `tree`
    ///
    /// Falls back to no owner when the tree has no UID yet.
    pub fn owned_by(tree: &FolderTree) -> Self {
        Self {
            tree: tree.name_any(),
            owner: tree.controller_owner_ref(&()),
        }
    }

    /// Builder without owner references
    pub fn unowned(tree: &FolderTree) -> Self {
        Self {
            tree: tree.name_any(),
            owner: None,
        }
    }

    /// Tree name the builder stamps on bindings
    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// Build the RoleBinding `template` produces in `namespace`
    pub fn build(&self, template: &RoleBindingTemplate, namespace: &str) -> RoleBinding {
        RoleBinding {
            metadata: ObjectMeta {
                name: Some(binding_name(&self.tree, &template.name)),
                namespace: Some(namespace.to_string()),
                labels: Some(tracking_labels(&self.tree, &template.name)),
                owner_references: self.owner.clone().map(|o| vec![o]),
                ..Default::default()
            },
            subjects: Some(template.subjects.iter().map(RbacSubject::from).collect()),
            role_ref: (&template.role_ref).into(),
        }
    }
}

/// Copy of `existing` with the desired subjects, roleRef and tracking labels
///
/// Other labels, annotations and owner references are left alone.
pub fn refreshed(existing: &RoleBinding, desired: &RoleBinding) -> RoleBinding {
    let mut updated = existing.clone();
    updated.subjects = desired.subjects.clone();
    updated.role_ref = desired.role_ref.clone();
    updated
        .labels_mut()
        .extend(desired.labels().iter().map(|(k, v)| (k.clone(), v.clone())));
    updated
}
