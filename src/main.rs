//! Folders operator - hierarchical RBAC for Kubernetes namespaces

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};

use folders::config::{ControllerArgs, OperatorConfig};
use folders::controller::build_folder_tree_controller;
use folders::crd::FolderTree;
use folders::telemetry::{init_telemetry, TelemetryConfig};
use folders::webhook::{self, AccessValidator, ImpersonatorImpl, WebhookState};
use folders::FIELD_MANAGER;

/// Folders - FolderTree-driven RoleBinding management
#[derive(Parser, Debug)]
#[command(name = "folders", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Reconciles FolderTrees into RoleBindings and, unless disabled, serves
    /// the validating admission webhook that blocks privilege escalation.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install FIPS-validated crypto provider: {:?}. \
             The webhook cannot serve TLS without it.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&FolderTree::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = cli.controller.into_config();
    init_telemetry(TelemetryConfig {
        format: config.log_format,
    })?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(config).await,
    }
}

/// Ensure the FolderTree CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply.
/// This ensures the CRD version always matches the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing FolderTree CRD...");
    crds.patch(
        "foldertrees.rbac.kubevirt.io",
        &params,
        &Patch::Apply(&FolderTree::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install FolderTree CRD: {}", e))?;

    Ok(())
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!("Folders controller starting...");

    let kube_config = kube::Config::infer()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load Kubernetes config: {}", e))?;
    let client = Client::try_from(kube_config.clone())
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let webhook_task = match &config.webhook {
        Some(webhook_config) => {
            let validator = AccessValidator::new(
                Arc::new(ImpersonatorImpl::new(kube_config)),
                config.trusted_identities.clone(),
            );
            let state = Arc::new(WebhookState::new(validator));
            Some(webhook::serve(webhook_config, state).await?)
        }
        None => {
            tracing::warn!(
                "Admission webhook disabled, FolderTree writes are not checked for privilege escalation"
            );
            None
        }
    };

    tracing::info!("Starting controllers:");
    let controller = build_folder_tree_controller(client);

    let Some(mut webhook_task) = webhook_task else {
        controller.await;
        tracing::info!("Folders controller shutting down");
        return Ok(());
    };

    tokio::select! {
        () = controller => {
            webhook_task.abort();
            tracing::info!("Folders controller shutting down");
            Ok(())
        }
        result = &mut webhook_task => match result {
            Ok(Ok(())) => Err(anyhow::anyhow!("Admission webhook server stopped unexpectedly")),
            Ok(Err(e)) => Err(anyhow::anyhow!("Admission webhook server failed: {}", e)),
            Err(e) => Err(anyhow::anyhow!("Admission webhook task panicked: {}", e)),
        },
    }
}
