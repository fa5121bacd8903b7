//! Applies RoleBinding operations against the cluster
//!
//! Operations run one at a time in the order the diff produced them. The
//! first failure aborts the pass; re-running the reconcile recomputes the
//! diff, so a partially applied pass converges on the next attempt.

use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::client::FolderTreeKubeClient;
use crate::rbac::{refreshed, BindingOperation, OperationKind};
use crate::Error;

/// Counts of what one pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// RoleBindings created
    pub created: usize,
    /// RoleBindings replaced
    pub updated: usize,
    /// RoleBindings deleted, including ones already gone
    pub deleted: usize,
    /// Creates skipped because the namespace does not exist yet
    pub skipped: usize,
}

enum Outcome {
    Created,
    Updated,
    Deleted,
    Skipped,
}

/// Executes [`BindingOperation`]s through a [`FolderTreeKubeClient`]
pub struct GrantExecutor<'a> {
    kube: &'a dyn FolderTreeKubeClient,
}

impl<'a> GrantExecutor<'a> {
    /// Create an executor over `kube`
    pub fn new(kube: &'a dyn FolderTreeKubeClient) -> Self {
        Self { kube }
    }

    /// Apply `operations` in order, stopping at the first error
    pub async fn execute(
        &self,
        operations: &[BindingOperation],
    ) -> Result<ExecutionSummary, Error> {
        let mut summary = ExecutionSummary::default();

        for op in operations {
            match self.apply(op).await {
                Ok(Outcome::Created) => summary.created += 1,
                Ok(Outcome::Updated) => summary.updated += 1,
                Ok(Outcome::Deleted) => summary.deleted += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!(operation = %op, error = %e, "failed to execute operation");
                    return Err(e);
                }
            }
        }

        Ok(summary)
    }

    async fn apply(&self, op: &BindingOperation) -> Result<Outcome, Error> {
        match op.kind {
            OperationKind::Create => {
                let desired = required(op, op.desired.as_ref())?;
                // A Namespace watch re-triggers the reconcile once it appears
                if !self.kube.namespace_exists(&op.namespace).await? {
                    info!(
                        namespace = %op.namespace,
                        binding = %desired.name_any(),
                        "namespace not found, skipping RoleBinding creation"
                    );
                    return Ok(Outcome::Skipped);
                }
                self.kube.create_binding(desired).await?;
                info!(operation = %op, "created RoleBinding");
                Ok(Outcome::Created)
            }
            OperationKind::Update => {
                let existing = required(op, op.existing.as_ref())?;
                let desired = required(op, op.desired.as_ref())?;
                self.kube.replace_binding(&refreshed(existing, desired)).await?;
                info!(operation = %op, "updated RoleBinding");
                Ok(Outcome::Updated)
            }
            OperationKind::Delete => {
                let name = op.binding_name();
                match self.kube.delete_binding(&op.namespace, &name).await {
                    Ok(()) => info!(operation = %op, "deleted RoleBinding"),
                    Err(e) if e.is_not_found() => {
                        debug!(operation = %op, "RoleBinding already gone");
                    }
                    Err(e) => return Err(e),
                }
                Ok(Outcome::Deleted)
            }
        }
    }
}

fn required<'o>(
    op: &BindingOperation,
    binding: Option<&'o RoleBinding>,
) -> Result<&'o RoleBinding, Error> {
    binding.ok_or_else(|| {
        Error::internal_with_context("executor", format!("{op} is missing its RoleBinding"))
    })
}
