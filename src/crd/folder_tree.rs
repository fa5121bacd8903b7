//! FolderTree Custom Resource Definition
//!
//! A FolderTree declares a hierarchy of folders. Each folder owns a set of
//! namespaces and RoleBinding templates; templates marked `propagate` are
//! inherited by every folder below it in `spec.tree`.

use std::collections::BTreeSet;

use k8s_openapi::api::rbac::v1 as rbacv1;
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{ArrayValidation, InstanceType, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Specification for a FolderTree
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "rbac.kubevirt.io",
    version = "v1alpha1",
    kind = "FolderTree",
    plural = "foldertrees",
    shortname = "ft",
    status = "FolderTreeStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FolderTreeSpec {
    /// Root of the folder hierarchy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeNode>,

    /// Folder definitions, referenced by name from `tree`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<Folder>,
}

impl FolderTreeSpec {
    /// Names of every folder reachable from `tree`
    pub fn tree_folder_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        if let Some(root) = &self.tree {
            root.collect_names(&mut names);
        }
        names
    }

    /// Folders that no tree node references
    pub fn standalone_folders(&self) -> impl Iterator<Item = &Folder> {
        let in_tree = self.tree_folder_names();
        self.folders
            .iter()
            .filter(move |f| !in_tree.contains(f.name.as_str()))
    }
}

/// Node in the folder hierarchy
///
/// Nodes only carry structure. The folder with the same name supplies the
/// namespaces and templates.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TreeNode {
    /// Folder name this node refers to
    pub name: String,

    /// Child nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "subfolders_schema")]
    pub subfolders: Vec<TreeNode>,
}

impl TreeNode {
    /// Create a leaf node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subfolders: Vec::new(),
        }
    }

    /// Attach child nodes
    pub fn with_subfolders(mut self, subfolders: impl IntoIterator<Item = TreeNode>) -> Self {
        self.subfolders.extend(subfolders);
        self
    }

    fn collect_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        names.insert(self.name.as_str());
        for child in &self.subfolders {
            child.collect_names(names);
        }
    }
}

/// Structural schemas cannot recurse, so subfolder items are left open.
fn subfolders_schema(_: &mut SchemaGenerator) -> Schema {
    let mut item = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    item.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );

    SchemaObject {
        instance_type: Some(InstanceType::Array.into()),
        array: Some(Box::new(ArrayValidation {
            items: Some(SingleOrVec::Single(Box::new(Schema::Object(item)))),
            ..Default::default()
        })),
        ..Default::default()
    }
    .into()
}

/// A named group of namespaces sharing RoleBinding templates
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Folder name, unique within the tree
    pub name: String,

    /// Templates applied to this folder's namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_binding_templates: Vec<RoleBindingTemplate>,

    /// Namespaces owned by this folder
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

impl Folder {
    /// Create an empty folder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a template
    pub fn with_template(mut self, template: RoleBindingTemplate) -> Self {
        self.role_binding_templates.push(template);
        self
    }

    /// Add namespaces
    pub fn with_namespaces<S: Into<String>>(
        mut self,
        namespaces: impl IntoIterator<Item = S>,
    ) -> Self {
        self.namespaces.extend(namespaces.into_iter().map(Into::into));
        self
    }
}

/// Blueprint for the RoleBindings a folder produces
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleBindingTemplate {
    /// Template name, unique within its folder
    pub name: String,

    /// Subjects bound by the generated RoleBindings
    #[serde(default)]
    pub subjects: Vec<Subject>,

    /// Role granted by the generated RoleBindings
    pub role_ref: RoleRef,

    /// Inherit into descendant folders. Absent means false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate: Option<bool>,
}

impl RoleBindingTemplate {
    /// Create a template granting `role_ref` with no subjects
    pub fn new(name: impl Into<String>, role_ref: RoleRef) -> Self {
        Self {
            name: name.into(),
            subjects: Vec::new(),
            role_ref,
            propagate: None,
        }
    }

    /// Add a subject
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    /// Mark the template as inherited by descendants
    pub fn propagating(mut self) -> Self {
        self.propagate = Some(true);
        self
    }

    /// Whether descendants inherit this template
    pub fn propagates(&self) -> bool {
        self.propagate.unwrap_or(false)
    }
}

/// Identity a RoleBinding grants to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// User, Group or ServiceAccount
    pub kind: String,

    /// Subject name
    pub name: String,

    /// Namespace, for ServiceAccount subjects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// API group, `rbac.authorization.k8s.io` for users and groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

impl Subject {
    /// A user subject
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: "User".to_string(),
            name: name.into(),
            namespace: None,
            api_group: Some(RBAC_API_GROUP.to_string()),
        }
    }

    /// A group subject
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: "Group".to_string(),
            name: name.into(),
            namespace: None,
            api_group: Some(RBAC_API_GROUP.to_string()),
        }
    }
}

impl From<&Subject> for rbacv1::Subject {
    fn from(s: &Subject) -> Self {
        rbacv1::Subject {
            kind: s.kind.clone(),
            name: s.name.clone(),
            namespace: s.namespace.clone(),
            api_group: s.api_group.clone(),
        }
    }
}

/// API group of Role and ClusterRole
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Role or ClusterRole reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// API group of the referenced role
    pub api_group: String,

    /// Role or ClusterRole
    pub kind: String,

    /// Role name
    pub name: String,
}

impl RoleRef {
    /// Reference a ClusterRole
    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: name.into(),
        }
    }
}

impl From<&RoleRef> for rbacv1::RoleRef {
    fn from(r: &RoleRef) -> Self {
        rbacv1::RoleRef {
            api_group: r.api_group.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
        }
    }
}

/// Status of a FolderTree
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderTreeStatus {
    /// Ready / ProcessingFailed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// `metadata.generation` of the last processed spec
    #[serde(default)]
    pub processed_generation: i64,
}

impl FolderTreeStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
