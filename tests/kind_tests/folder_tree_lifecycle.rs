//! Integration tests for the FolderTree controller
//!
//! These tests tell the story of an administrator arranging namespaces into
//! folders and relying on the controller to keep RoleBindings in line.

use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};

use folders::crd::{
    Folder, FolderTree, FolderTreeSpec, RoleBindingTemplate, RoleRef, Subject, TreeNode,
    CONDITION_READY,
};
use folders::rbac::{template_of, TREE_LABEL};

use super::helpers::{
    create_namespace, delete_namespaces, delete_tree, ensure_test_cluster, eventually,
    start_controller,
};

// =============================================================================
// Test Fixtures
// =============================================================================

/// `root` grants `admin` everywhere below it; `child` adds a local `editor`
fn inheriting_tree(name: &str, child_namespace: &str) -> FolderTree {
    FolderTree::new(
        name,
        FolderTreeSpec {
            tree: Some(TreeNode::new("root").with_subfolders(vec![TreeNode::new("child")])),
            folders: vec![
                Folder::new("root").with_template(
                    RoleBindingTemplate::new("admin", RoleRef::cluster_role("admin"))
                        .with_subject(Subject::group("platform-admins"))
                        .propagating(),
                ),
                Folder::new("child")
                    .with_template(
                        RoleBindingTemplate::new("editor", RoleRef::cluster_role("edit"))
                            .with_subject(Subject::user("dev@example.com")),
                    )
                    .with_namespaces([child_namespace]),
            ],
        },
    )
}

async fn templates_in(client: &Client, tree: &str, namespace: &str) -> Vec<String> {
    let api: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
    let params = kube::api::ListParams::default().labels(&format!("{TREE_LABEL}={tree}"));
    let mut templates: Vec<String> = match api.list(&params).await {
        Ok(list) => list
            .items
            .iter()
            .filter_map(|rb| template_of(rb).map(String::from))
            .collect(),
        Err(_) => Vec::new(),
    };
    templates.sort();
    templates
}

// =============================================================================
// Inheritance Stories
// =============================================================================

/// Story: A namespace in a child folder receives inherited and local grants
///
/// Expected behavior:
/// - `ns` gets both `admin` (inherited from root) and `editor` (local)
/// - The tree reports Ready
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_child_namespace_receives_inherited_bindings() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let controller = start_controller(client.clone());
    let (tree, ns) = ("it-inherit", "it-inherit-ns");

    create_namespace(&client, ns).await;
    let trees: Api<FolderTree> = Api::all(client.clone());
    trees
        .create(&PostParams::default(), &inheriting_tree(tree, ns))
        .await
        .expect("failed to create FolderTree");

    eventually("admin and editor bindings", || async {
        templates_in(&client, tree, ns).await == vec!["admin", "editor"]
    })
    .await;

    eventually("Ready condition", || async {
        trees
            .get(tree)
            .await
            .ok()
            .and_then(|t| t.status)
            .and_then(|s| s.condition(CONDITION_READY).map(|c| c.status.to_string()))
            .as_deref()
            == Some("True")
    })
    .await;

    delete_tree(&client, tree).await;
    delete_namespaces(&client, &[ns]).await;
    controller.abort();
}

/// Story: Bindings for a namespace that does not exist yet appear once it does
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_late_namespace_is_picked_up() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let controller = start_controller(client.clone());
    let (tree, ns) = ("it-late", "it-late-ns");

    let trees: Api<FolderTree> = Api::all(client.clone());
    trees
        .create(&PostParams::default(), &inheriting_tree(tree, ns))
        .await
        .expect("failed to create FolderTree");

    // Missing namespace is skipped, not a failure
    eventually("Ready condition without the namespace", || async {
        trees
            .get(tree)
            .await
            .ok()
            .and_then(|t| t.status)
            .is_some_and(|s| s.condition(CONDITION_READY).is_some())
    })
    .await;

    create_namespace(&client, ns).await;
    eventually("bindings in the new namespace", || async {
        templates_in(&client, tree, ns).await == vec!["admin", "editor"]
    })
    .await;

    delete_tree(&client, tree).await;
    delete_namespaces(&client, &[ns]).await;
    controller.abort();
}

// =============================================================================
// Drift Stories
// =============================================================================

/// Story: A manually deleted binding is recreated
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_deleted_binding_is_restored() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let controller = start_controller(client.clone());
    let (tree, ns) = ("it-drift", "it-drift-ns");

    create_namespace(&client, ns).await;
    let trees: Api<FolderTree> = Api::all(client.clone());
    trees
        .create(&PostParams::default(), &inheriting_tree(tree, ns))
        .await
        .expect("failed to create FolderTree");
    eventually("initial bindings", || async {
        templates_in(&client, tree, ns).await.len() == 2
    })
    .await;

    let bindings: Api<RoleBinding> = Api::namespaced(client.clone(), ns);
    bindings
        .delete(&format!("foldertree-{tree}-editor"), &DeleteParams::default())
        .await
        .expect("failed to delete binding");

    eventually("editor binding restored", || async {
        bindings
            .get_opt(&format!("foldertree-{tree}-editor"))
            .await
            .ok()
            .flatten()
            .is_some_and(|rb| rb.owner_references().len() == 1)
    })
    .await;

    delete_tree(&client, tree).await;
    delete_namespaces(&client, &[ns]).await;
    controller.abort();
}

/// Story: Moving a namespace out of the tree removes its bindings
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_removed_namespace_loses_bindings() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let controller = start_controller(client.clone());
    let (tree, ns) = ("it-remove", "it-remove-ns");

    create_namespace(&client, ns).await;
    let trees: Api<FolderTree> = Api::all(client.clone());
    let created = trees
        .create(&PostParams::default(), &inheriting_tree(tree, ns))
        .await
        .expect("failed to create FolderTree");
    eventually("initial bindings", || async {
        templates_in(&client, tree, ns).await.len() == 2
    })
    .await;

    let mut updated = created;
    updated.spec.folders[1].namespaces.clear();
    trees
        .replace(tree, &PostParams::default(), &updated)
        .await
        .expect("failed to update FolderTree");

    eventually("bindings removed", || async {
        templates_in(&client, tree, ns).await.is_empty()
    })
    .await;

    delete_tree(&client, tree).await;
    delete_namespaces(&client, &[ns]).await;
    controller.abort();
}
