//! Validating admission webhook for FolderTrees
//!
//! The controller applies whatever a FolderTree describes, using its own
//! privileges. The webhook closes that gap: a FolderTree write is admitted
//! only when the requester could have made every resulting RoleBinding
//! change directly.
//!
//! - [`access`]: impersonated dry-run checks
//! - [`folder_tree`]: AdmissionReview handling

pub mod access;
pub mod folder_tree;

use std::sync::Arc;

use axum::{routing::post, Router};
use axum_server::tls_rustls::RustlsConfig;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use access::{
    AccessValidator, DryRunBindings, DryRunBindingsImpl, Impersonator, ImpersonatorImpl,
    Requester, CONTROLLER_IDENTITY, DEFAULT_TRUSTED_IDENTITIES,
};

use crate::config::WebhookConfig;
use crate::Error;

/// Path the API server posts FolderTree AdmissionReviews to
pub const VALIDATE_PATH: &str = "/validate-rbac-kubevirt-io-v1alpha1-foldertree";

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Decides FolderTree writes
    pub validator: AccessValidator,
}

impl WebhookState {
    /// Create a new webhook state around `validator`
    pub fn new(validator: AccessValidator) -> Self {
        Self { validator }
    }
}

/// Create the webhook router
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(folder_tree::validate_handler))
        .with_state(state)
}

/// Start serving the webhook over TLS
///
/// Fails if the serving certificate cannot be loaded. Errors after that end
/// the spawned task, whose handle resolves to the error.
pub async fn serve(
    config: &WebhookConfig,
    state: Arc<WebhookState>,
) -> Result<JoinHandle<Result<(), Error>>, Error> {
    let tls = RustlsConfig::from_pem_file(config.cert_path(), config.key_path())
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "webhook",
                format!(
                    "failed to load serving certificate from {}: {e}",
                    config.cert_dir.display()
                ),
            )
        })?;

    let addr = config.addr;
    let router = webhook_router(state);
    info!(%addr, path = VALIDATE_PATH, "starting FolderTree admission webhook");

    Ok(tokio::spawn(async move {
        axum_server::bind_rustls(addr, tls)
            .serve(router.into_make_service())
            .await
            .map_err(|e| {
                error!(error = %e, "admission webhook server failed");
                Error::internal_with_context("webhook", format!("server on {addr} failed: {e}"))
            })
    }))
}
