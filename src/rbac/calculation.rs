//! Inheritance calculation
//!
//! Walks `spec.tree` from the root, carrying the templates each folder
//! propagates down to its descendants, and produces one RoleBinding per
//! (namespace, template) pair. Folders that the tree never references are
//! handled afterwards as standalone units with no inheritance in or out.
//!
//! Templates without `propagate: true` stay in the folder that defines them.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::ResourceExt;

use super::binding::BindingBuilder;
use crate::crd::{Folder, FolderTree, RoleBindingTemplate, Subject, TreeNode};
use crate::Error;

/// Identity of a RoleBinding: namespace plus name
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingKey {
    /// Namespace the binding lives in
    pub namespace: String,
    /// Binding name
    pub name: String,
}

impl BindingKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a live or built RoleBinding
    pub fn of(binding: &RoleBinding) -> Self {
        Self::new(binding.namespace().unwrap_or_default(), binding.name_any())
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A RoleBinding the tree requires, with where it came from
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredBinding {
    /// Target namespace
    pub namespace: String,
    /// Folder whose namespace received the binding
    pub folder: String,
    /// Template that produced the binding
    pub template: RoleBindingTemplate,
    /// The built RoleBinding
    pub binding: RoleBinding,
}

/// Every RoleBinding a FolderTree requires, ordered by key
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DesiredBindingSet {
    bindings: BTreeMap<BindingKey, DesiredBinding>,
}

impl DesiredBindingSet {
    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True when the tree requires no bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Look up a binding by key
    pub fn get(&self, key: &BindingKey) -> Option<&DesiredBinding> {
        self.bindings.get(key)
    }

    /// Whether a binding exists for `key`
    pub fn contains(&self, key: &BindingKey) -> bool {
        self.bindings.contains_key(key)
    }

    /// Iterate in key order
    pub fn iter(&self) -> impl Iterator<Item = (&BindingKey, &DesiredBinding)> {
        self.bindings.iter()
    }

    #[cfg(test)]
    fn templates_in(&self, namespace: &str) -> Vec<&str> {
        self.bindings
            .values()
            .filter(|d| d.namespace == namespace)
            .map(|d| d.template.name.as_str())
            .collect()
    }

    fn insert(&mut self, tree: &str, desired: DesiredBinding) -> Result<(), Error> {
        match self.bindings.entry(BindingKey::of(&desired.binding)) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(desired);
                Ok(())
            }
            // The same grant reached twice is not ambiguous
            btree_map::Entry::Occupied(slot)
                if same_grant(&slot.get().template, &desired.template) =>
            {
                Ok(())
            }
            btree_map::Entry::Occupied(_) => Err(Error::inheritance_conflict(
                tree,
                desired.folder,
                desired.template.name,
                desired.namespace,
            )),
        }
    }
}

impl<'a> IntoIterator for &'a DesiredBindingSet {
    type Item = (&'a BindingKey, &'a DesiredBinding);
    type IntoIter = btree_map::Iter<'a, BindingKey, DesiredBinding>;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings.iter()
    }
}

fn same_grant(a: &RoleBindingTemplate, b: &RoleBindingTemplate) -> bool {
    let subjects =
        |t: &RoleBindingTemplate| t.subjects.iter().cloned().collect::<BTreeSet<Subject>>();
    a.role_ref == b.role_ref && subjects(a) == subjects(b)
}

/// Calculate every RoleBinding `tree` requires
///
/// Two emissions with the same key but different grants (for example a
/// template redefined under an ancestor's name) fail the whole calculation
/// with [`Error::InheritanceConflict`].
pub fn calculate_desired_bindings(
    tree: &FolderTree,
    builder: &BindingBuilder,
) -> Result<DesiredBindingSet, Error> {
    let folders: HashMap<&str, &Folder> = tree
        .spec
        .folders
        .iter()
        .map(|f| (f.name.as_str(), f))
        .collect();

    let mut walker = Walker {
        folders,
        builder,
        desired: DesiredBindingSet::default(),
    };

    if let Some(root) = &tree.spec.tree {
        walker.walk(root, &[])?;
    }

    for folder in tree.spec.standalone_folders() {
        walker.emit(folder, folder.role_binding_templates.iter())?;
    }

    Ok(walker.desired)
}

struct Walker<'a> {
    folders: HashMap<&'a str, &'a Folder>,
    builder: &'a BindingBuilder,
    desired: DesiredBindingSet,
}

impl<'a> Walker<'a> {
    fn walk(
        &mut self,
        node: &'a TreeNode,
        inherited: &[&'a RoleBindingTemplate],
    ) -> Result<(), Error> {
        let mut passed_down = inherited.to_vec();

        // A node without a folder passes its inheritance through untouched
        if let Some(folder) = self.folders.get(node.name.as_str()).copied() {
            let merged = inherited
                .iter()
                .copied()
                .chain(folder.role_binding_templates.iter());
            self.emit(folder, merged)?;

            passed_down.extend(folder.role_binding_templates.iter().filter(|t| t.propagates()));
        }

        for child in &node.subfolders {
            self.walk(child, &passed_down)?;
        }
        Ok(())
    }

    fn emit(
        &mut self,
        folder: &Folder,
        templates: impl Iterator<Item = &'a RoleBindingTemplate> + Clone,
    ) -> Result<(), Error> {
        for namespace in &folder.namespaces {
            for template in templates.clone() {
                let desired = DesiredBinding {
                    namespace: namespace.clone(),
                    folder: folder.name.clone(),
                    template: template.clone(),
                    binding: self.builder.build(template, namespace),
                };
                self.desired.insert(self.builder.tree(), desired)?;
            }
        }
        Ok(())
    }
}
