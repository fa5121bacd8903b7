//! FolderTree reconciliation
//!
//! Each pass calculates the RoleBindings the tree requires, lists the ones
//! currently labelled with the tree name, diffs the two and applies the
//! result. Drift on owned RoleBindings and new Namespaces re-trigger the
//! pass through watches, so success never schedules a requeue.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::client::{FolderTreeKubeClient, FolderTreeKubeClientImpl};
use super::executor::{ExecutionSummary, GrantExecutor};
use crate::crd::{
    set_condition, Condition, ConditionStatus, FolderTree, CONDITION_PROCESSING_FAILED,
    CONDITION_READY,
};
use crate::rbac::{calculate_desired_bindings, compute_cluster_diff, BindingBuilder};
use crate::Error;

/// Message of the Ready condition
pub const READY_MESSAGE: &str = "FolderTree processed successfully";

/// Controller context shared across reconciliations
pub struct Context {
    /// Kubernetes client for API operations
    pub kube: Arc<dyn FolderTreeKubeClient>,
}

impl Context {
    /// Create a context over any client implementation
    pub fn new(kube: Arc<dyn FolderTreeKubeClient>) -> Self {
        Self { kube }
    }

    /// Create a context backed by a real Kubernetes client
    pub fn from_client(client: Client) -> Self {
        Self::new(Arc::new(FolderTreeKubeClientImpl::new(client)))
    }
}

/// Reconcile a FolderTree
///
/// Returns `await_change` on success. Failures are recorded in the
/// `ProcessingFailed` condition and handed to [`error_policy`].
#[instrument(skip(tree, ctx), fields(tree = %tree.name_any()))]
pub async fn reconcile(tree: Arc<FolderTree>, ctx: Arc<Context>) -> Result<Action, Error> {
    if tree.metadata.deletion_timestamp.is_some() {
        debug!("folder tree is being deleted, garbage collection removes its bindings");
        return Ok(Action::await_change());
    }

    info!("reconciling folder tree");

    match sync_bindings(&tree, &ctx).await {
        Ok(summary) => {
            info!(
                created = summary.created,
                updated = summary.updated,
                deleted = summary.deleted,
                skipped = summary.skipped,
                "folder tree processed"
            );
            let ready = Condition::new(
                CONDITION_READY,
                ConditionStatus::True,
                CONDITION_READY,
                READY_MESSAGE,
            );
            update_status(&tree, &ctx, ready, CONDITION_PROCESSING_FAILED).await?;
            Ok(Action::await_change())
        }
        Err(e) => {
            warn!(error = %e, "failed to process folder tree");
            let failed = Condition::new(
                CONDITION_PROCESSING_FAILED,
                ConditionStatus::True,
                CONDITION_PROCESSING_FAILED,
                e.to_string(),
            );
            if let Err(status_err) = update_status(&tree, &ctx, failed, CONDITION_READY).await {
                warn!(error = %status_err, "failed to record ProcessingFailed condition");
            }
            Err(e)
        }
    }
}

async fn sync_bindings(tree: &FolderTree, ctx: &Context) -> Result<ExecutionSummary, Error> {
    let desired = calculate_desired_bindings(tree, &BindingBuilder::owned_by(tree))?;
    let live = ctx.kube.list_tree_bindings(&tree.name_any()).await?;
    let operations = compute_cluster_diff(&desired, &live);

    debug!(
        desired = desired.len(),
        live = live.len(),
        operations = operations.len(),
        "computed RoleBinding diff"
    );

    GrantExecutor::new(ctx.kube.as_ref()).execute(&operations).await
}

/// Set `condition`, drop `replaces`, record the processed generation
///
/// Skips the write when nothing changed so status updates do not retrigger
/// the controller.
async fn update_status(
    tree: &FolderTree,
    ctx: &Context,
    condition: Condition,
    replaces: &str,
) -> Result<(), Error> {
    let current = tree.status.clone().unwrap_or_default();
    let mut status = current.clone();
    set_condition(&mut status.conditions, condition, &[replaces]);
    status.processed_generation = tree.metadata.generation.unwrap_or_default();

    if tree.status.is_some() && status == current {
        debug!("status unchanged, skipping update");
        return Ok(());
    }

    ctx.kube.patch_status(&tree.name_any(), &status).await
}

/// Error policy for the FolderTree controller
///
/// Retryable errors requeue after 30 seconds; permanent ones wait for the
/// spec to change.
pub fn error_policy(tree: Arc<FolderTree>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        tree = %tree.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(30))
    } else {
        Action::await_change()
    }
}
