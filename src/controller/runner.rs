//! Builds the FolderTree controller future

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use super::folder_tree::{error_policy, reconcile, Context};
use crate::crd::FolderTree;
use crate::rbac::managed_selector;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
///
/// The API server closes the watch before the client times out, which avoids
/// "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the FolderTree controller
///
/// Besides FolderTrees it watches:
/// - RoleBindings carrying the managed-by label, mapped to their owner, so
///   manual edits or deletes are reverted
/// - Namespaces, mapped to every known FolderTree, so skipped creates are
///   retried once their namespace appears
pub fn build_folder_tree_controller(client: Client) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let trees: Api<FolderTree> = Api::all(client.clone());
    let bindings: Api<RoleBinding> = Api::all(client.clone());
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ctx = Arc::new(Context::from_client(client));

    tracing::info!("- FolderTree controller");

    let controller = Controller::new(trees, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS));
    let store = controller.store();

    Box::pin(
        controller
            .owns(
                bindings,
                WatcherConfig::default()
                    .labels(&managed_selector())
                    .timeout(WATCH_TIMEOUT_SECS),
            )
            .watches(
                namespaces,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                move |_ns: Namespace| all_trees(&store.state()),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("FolderTree")),
    )
}

/// References to every cached FolderTree
fn all_trees(cached: &[Arc<FolderTree>]) -> Vec<ObjectRef<FolderTree>> {
    cached.iter().map(|tree| ObjectRef::from_obj(tree.as_ref())).collect()
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
