//! Test helpers for integration tests
//!
//! Provides utilities for managing the kind cluster, namespaces and polling
//! for the controller's effects.

use std::future::Future;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Client, Config, CustomResourceExt};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use folders::controller::build_folder_tree_controller;
use folders::crd::FolderTree;

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "folders-integration-test";

/// How long to wait for the controller to converge
pub const CONVERGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Global lock to ensure cluster is created only once
static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Track if CRD has been installed (async-safe)
static CRD_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Check if a kind cluster with the given name exists
pub fn kind_cluster_exists(name: &str) -> bool {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .expect("failed to run kind");

    let clusters = String::from_utf8_lossy(&output.stdout);
    clusters.lines().any(|line| line.trim() == name)
}

/// Create a kind cluster for testing
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name) {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    println!("Kind cluster '{name}' created successfully");
    Ok(())
}

/// Install (or update) the FolderTree CRD
pub async fn install_crd(client: &Client) -> Result<(), kube::Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("folders-integration-test").force();

    println!("Installing FolderTree CRD...");
    crds.patch(
        "foldertrees.rbac.kubevirt.io",
        &params,
        &Patch::Apply(&FolderTree::crd()),
    )
    .await?;

    // Wait for CRD to be established
    sleep(Duration::from_secs(2)).await;
    Ok(())
}

/// Create a Kubernetes client connected to the test cluster
pub async fn create_test_client() -> Result<Client, String> {
    let context_name = format!("kind-{TEST_CLUSTER_NAME}");

    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(context_name),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster is ready (thread-safe, cluster created once)
///
/// Returns a fresh Client for each call - clients should not be shared across test threads.
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cluster_result = CLUSTER_INIT.get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME));
    cluster_result.clone()?;

    let client = create_test_client().await?;

    let crd_result = CRD_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            install_crd(&client)
                .await
                .map_err(|e| format!("failed to install CRD: {e}"))
        })
        .await;
    crd_result.clone()?;

    Ok(client)
}

/// Run the controller in the background for the duration of a test
pub fn start_controller(client: Client) -> JoinHandle<()> {
    tokio::spawn(build_folder_tree_controller(client))
}

/// Create a namespace, ignoring AlreadyExists
pub async fn create_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match api.create(&PostParams::default(), &ns).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 409 => {}
        Err(e) => panic!("failed to create namespace {name}: {e}"),
    }
}

/// Delete namespaces, ignoring errors
pub async fn delete_namespaces(client: &Client, names: &[&str]) {
    let api: Api<Namespace> = Api::all(client.clone());
    for name in names {
        let _ = api.delete(name, &DeleteParams::default()).await;
    }
}

/// Delete a FolderTree, ignoring errors
pub async fn delete_tree(client: &Client, name: &str) {
    let api: Api<FolderTree> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Poll `check` until it returns true or `CONVERGE_TIMEOUT` passes
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + CONVERGE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        sleep(Duration::from_secs(1)).await;
    }
    panic!("timed out waiting for {what}");
}
