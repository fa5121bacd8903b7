//! Diff between desired RoleBindings and a baseline
//!
//! One comparison primitive serves two callers:
//! - the controller compares the desired set against RoleBindings listed
//!   from the cluster ([`compute_cluster_diff`])
//! - the admission webhook compares the desired sets of the old and new
//!   FolderTree without touching the cluster ([`compute_spec_diff`])
//!
//! `roleRef` is immutable on RoleBindings, so a roleRef change becomes a
//! DELETE followed by a CREATE of the same key rather than an UPDATE.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::api::rbac::v1::{RoleBinding, Subject};
use kube::ResourceExt;

use super::binding::{template_of, BindingBuilder};
use super::calculation::{calculate_desired_bindings, BindingKey, DesiredBindingSet};
use crate::crd::FolderTree;
use crate::Error;

/// Kind of change to a RoleBinding
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    /// Binding is missing
    Create,
    /// Binding exists with stale subjects or labels
    Update,
    /// Binding is no longer desired
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A single RoleBinding change
#[derive(Clone, Debug, PartialEq)]
pub struct BindingOperation {
    /// What to do
    pub kind: OperationKind,
    /// Target namespace
    pub namespace: String,
    /// Template the binding belongs to
    pub template: String,
    /// Current binding, absent for CREATE
    pub existing: Option<RoleBinding>,
    /// Target binding, absent for DELETE
    pub desired: Option<RoleBinding>,
}

impl BindingOperation {
    /// Name of the RoleBinding this operation touches
    pub fn binding_name(&self) -> String {
        self.desired
            .as_ref()
            .or(self.existing.as_ref())
            .map(ResourceExt::name_any)
            .unwrap_or_default()
    }

    fn create(key: &BindingKey, template: &str, desired: &RoleBinding) -> Self {
        Self {
            kind: OperationKind::Create,
            namespace: key.namespace.clone(),
            template: template.to_string(),
            existing: None,
            desired: Some(desired.clone()),
        }
    }

    fn update(
        key: &BindingKey,
        template: &str,
        existing: &RoleBinding,
        desired: &RoleBinding,
    ) -> Self {
        Self {
            kind: OperationKind::Update,
            namespace: key.namespace.clone(),
            template: template.to_string(),
            existing: Some(existing.clone()),
            desired: Some(desired.clone()),
        }
    }

    fn delete(key: &BindingKey, template: &str, existing: &RoleBinding) -> Self {
        Self {
            kind: OperationKind::Delete,
            namespace: key.namespace.clone(),
            template: template.to_string(),
            existing: Some(existing.clone()),
            desired: None,
        }
    }
}

impl fmt::Display for BindingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} RoleBinding '{}' in namespace '{}' for template '{}'",
            self.kind,
            self.binding_name(),
            self.namespace,
            self.template
        )
    }
}

/// A baseline binding and the template it came from
struct Baseline<'a> {
    binding: &'a RoleBinding,
    template: &'a str,
}

/// Compare a baseline with the desired set
///
/// Desired keys are walked first in key order, then baseline-only keys.
fn compare(
    baseline: &BTreeMap<BindingKey, Baseline<'_>>,
    desired: &DesiredBindingSet,
) -> Vec<BindingOperation> {
    let mut operations = Vec::new();

    for (key, want) in desired {
        let template = want.template.name.as_str();
        match baseline.get(key) {
            None => operations.push(BindingOperation::create(key, template, &want.binding)),
            Some(have) if have.binding.role_ref != want.binding.role_ref => {
                operations.push(BindingOperation::delete(key, have.template, have.binding));
                operations.push(BindingOperation::create(key, template, &want.binding));
            }
            Some(have) if needs_update(have.binding, &want.binding) => {
                operations.push(BindingOperation::update(
                    key,
                    template,
                    have.binding,
                    &want.binding,
                ));
            }
            Some(_) => {}
        }
    }

    for (key, have) in baseline {
        if !desired.contains(key) {
            operations.push(BindingOperation::delete(key, have.template, have.binding));
        }
    }

    operations
}

/// Whether `existing` needs its subjects or tracking labels refreshed
///
/// Subjects compare as a set; order does not matter. Labels only need to
/// include the desired ones.
pub fn needs_update(existing: &RoleBinding, desired: &RoleBinding) -> bool {
    if !subjects_equal(existing.subjects.as_deref(), desired.subjects.as_deref()) {
        return true;
    }
    if existing.role_ref != desired.role_ref {
        return true;
    }
    let have = existing.labels();
    desired
        .labels()
        .iter()
        .any(|(k, v)| have.get(k) != Some(v))
}

type SubjectKey<'a> = (&'a str, &'a str, &'a str, &'a str);

fn subject_key(s: &Subject) -> SubjectKey<'_> {
    (
        s.kind.as_str(),
        s.name.as_str(),
        s.namespace.as_deref().unwrap_or_default(),
        s.api_group.as_deref().unwrap_or_default(),
    )
}

fn subjects_equal(a: Option<&[Subject]>, b: Option<&[Subject]>) -> bool {
    let a = a.unwrap_or_default();
    let b = b.unwrap_or_default();
    if a.len() != b.len() {
        return false;
    }
    let a: BTreeSet<_> = a.iter().map(subject_key).collect();
    let b: BTreeSet<_> = b.iter().map(subject_key).collect();
    a == b
}

/// Diff the desired set against RoleBindings listed from the cluster
///
/// `live` should hold the bindings labelled with the tree name. A live-only
/// binding is deleted under the template recorded in its tracking label.
pub fn compute_cluster_diff(
    desired: &DesiredBindingSet,
    live: &[RoleBinding],
) -> Vec<BindingOperation> {
    let baseline: BTreeMap<_, _> = live
        .iter()
        .map(|rb| {
            (
                BindingKey::of(rb),
                Baseline {
                    binding: rb,
                    template: template_of(rb).unwrap_or_default(),
                },
            )
        })
        .collect();
    compare(&baseline, desired)
}

/// Diff the desired sets of two FolderTree versions
///
/// `old` is absent on create. Bindings are built without owner references
/// and nothing is read from the cluster.
pub fn compute_spec_diff(
    old: Option<&FolderTree>,
    new: &FolderTree,
) -> Result<Vec<BindingOperation>, Error> {
    let previous = match old {
        Some(old) => calculate_desired_bindings(old, &BindingBuilder::unowned(old))?,
        None => DesiredBindingSet::default(),
    };
    let next = calculate_desired_bindings(new, &BindingBuilder::unowned(new))?;

    let baseline: BTreeMap<_, _> = previous
        .iter()
        .map(|(key, d)| {
            (
                key.clone(),
                Baseline {
                    binding: &d.binding,
                    template: d.template.name.as_str(),
                },
            )
        })
        .collect();
    Ok(compare(&baseline, &next))
}
