//! Impersonated dry-run authorization for FolderTree writes
//!
//! A FolderTree grants whatever its templates say, so writing one must not
//! let a requester hand out access they could not grant directly. Every
//! RoleBinding operation the write implies is replayed as the requester in
//! dry-run mode; the API server's own RBAC escalation checks decide.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use chrono::Utc;
use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::crd::FolderTree;
use crate::rbac::{
    calculate_desired_bindings, compute_spec_diff, dry_run_binding_name, refreshed,
    BindingBuilder, BindingOperation, OperationKind,
};
use crate::{Error, FIELD_MANAGER};

/// Header carrying the impersonated user's UID
const IMPERSONATE_UID_HEADER: &str = "impersonate-uid";

/// Service account the controller runs as
pub const CONTROLLER_IDENTITY: &str =
    "system:serviceaccount:folders-system:folder-controller-manager";

/// Identities allowed to delete a FolderTree without the per-binding check
pub const DEFAULT_TRUSTED_IDENTITIES: [&str; 2] = [CONTROLLER_IDENTITY, "system:admin"];

/// The user behind an admission request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requester {
    /// Username as authenticated by the API server
    pub username: String,
    /// UID, when the authenticator supplied one
    pub uid: Option<String>,
    /// Group memberships
    pub groups: Vec<String>,
}

impl Requester {
    /// Requester with just a username
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            uid: None,
            groups: Vec::new(),
        }
    }

    /// Extract the requester from admission user info
    ///
    /// Returns `None` when no username is present.
    pub fn from_user_info(info: &UserInfo) -> Option<Self> {
        let username = info.username.as_deref().filter(|u| !u.is_empty())?;
        Some(Self {
            username: username.to_string(),
            uid: info.uid.clone().filter(|u| !u.is_empty()),
            groups: info.groups.clone().unwrap_or_default(),
        })
    }
}

/// Dry-run RoleBinding writes performed as some requester
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DryRunBindings: Send + Sync {
    /// Dry-run create of `binding`
    async fn dry_run_create(&self, binding: &RoleBinding) -> Result<(), Error>;
    /// Dry-run replace of `binding`
    async fn dry_run_replace(&self, binding: &RoleBinding) -> Result<(), Error>;
    /// Dry-run delete of the RoleBinding `name` in `namespace`
    async fn dry_run_delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Builds [`DryRunBindings`] clients acting as a requester
#[cfg_attr(test, automock)]
pub trait Impersonator: Send + Sync {
    /// Client whose every request is impersonated as `requester`
    fn client_for(&self, requester: &Requester) -> Result<Box<dyn DryRunBindings>, Error>;
}

/// [`Impersonator`] deriving clients from the operator's own kube config
pub struct ImpersonatorImpl {
    base: kube::Config,
}

impl ImpersonatorImpl {
    /// Impersonate on top of `base`
    pub fn new(base: kube::Config) -> Self {
        Self { base }
    }
}

impl Impersonator for ImpersonatorImpl {
    fn client_for(&self, requester: &Requester) -> Result<Box<dyn DryRunBindings>, Error> {
        let mut config = self.base.clone();
        config.auth_info.impersonate = Some(requester.username.clone());
        config.auth_info.impersonate_groups =
            (!requester.groups.is_empty()).then(|| requester.groups.clone());

        if let Some(uid) = &requester.uid {
            let value = HeaderValue::from_str(uid).map_err(|e| {
                Error::impersonation(&requester.username, format!("invalid uid: {e}"))
            })?;
            config
                .headers
                .push((HeaderName::from_static(IMPERSONATE_UID_HEADER), value));
        }

        let client = Client::try_from(config)
            .map_err(|e| Error::impersonation(&requester.username, e.to_string()))?;
        Ok(Box::new(DryRunBindingsImpl { client }))
    }
}

/// [`DryRunBindings`] over a kube client
pub struct DryRunBindingsImpl {
    client: Client,
}

impl DryRunBindingsImpl {
    fn api(&self, namespace: &str) -> Api<RoleBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            dry_run: true,
            field_manager: Some(FIELD_MANAGER.to_string()),
        }
    }
}

#[async_trait]
impl DryRunBindings for DryRunBindingsImpl {
    async fn dry_run_create(&self, binding: &RoleBinding) -> Result<(), Error> {
        let namespace = binding.namespace().unwrap_or_default();
        self.api(&namespace)
            .create(&Self::post_params(), binding)
            .await?;
        Ok(())
    }

    async fn dry_run_replace(&self, binding: &RoleBinding) -> Result<(), Error> {
        let namespace = binding.namespace().unwrap_or_default();
        self.api(&namespace)
            .replace(&binding.name_any(), &Self::post_params(), binding)
            .await?;
        Ok(())
    }

    async fn dry_run_delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let params = DeleteParams {
            dry_run: true,
            ..Default::default()
        };
        self.api(namespace).delete(name, &params).await?;
        Ok(())
    }
}

/// Decides whether a requester may perform a FolderTree write
pub struct AccessValidator {
    impersonator: Arc<dyn Impersonator>,
    trusted: BTreeSet<String>,
}

impl AccessValidator {
    /// Validator impersonating through `impersonator`
    ///
    /// `trusted` identities skip the check on FolderTree deletion.
    pub fn new<I, S>(impersonator: Arc<dyn Impersonator>, trusted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            impersonator,
            trusted: trusted.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `username` bypasses the delete check
    pub fn is_trusted(&self, username: &str) -> bool {
        self.trusted.contains(username)
    }

    /// Check a FolderTree create (`old` is `None`) or update
    ///
    /// Every operation between `old` and `new` is dry-run as the requester; the
    /// first rejection is returned as [`Error::PrivilegeEscalation`].
    pub async fn validate_write(
        &self,
        requester: &Requester,
        old: Option<&FolderTree>,
        new: &FolderTree,
    ) -> Result<(), Error> {
        let operations = compute_spec_diff(old, new)?;
        if operations.is_empty() {
            debug!(tree = %new.name_any(), "no RoleBinding changes to authorize");
            return Ok(());
        }

        let client = self.impersonator.client_for(requester)?;
        let tree = new.name_any();
        for op in &operations {
            authorize(client.as_ref(), &tree, op).await?;
        }

        info!(
            tree = %tree,
            user = %requester.username,
            operations = operations.len(),
            "authorized FolderTree write"
        );
        Ok(())
    }

    /// Check a FolderTree deletion
    ///
    /// Every RoleBinding the tree currently implies must be deletable by the
    /// requester.
    pub async fn validate_delete(
        &self,
        requester: &Requester,
        tree: &FolderTree,
    ) -> Result<(), Error> {
        let name = tree.name_any();
        if self.is_trusted(&requester.username) {
            debug!(
                tree = %name,
                user = %requester.username,
                "trusted identity, skipping delete check"
            );
            return Ok(());
        }

        let desired = calculate_desired_bindings(tree, &BindingBuilder::unowned(tree))?;
        if desired.is_empty() {
            return Ok(());
        }

        let client = self.impersonator.client_for(requester)?;
        for (key, binding) in &desired {
            dry_run_delete(client.as_ref(), &key.namespace, &key.name)
                .await
                .map_err(|e| {
                    escalation(
                        OperationKind::Delete,
                        &key.namespace,
                        &key.name,
                        &binding.template.name,
                        &e,
                    )
                })?;
        }

        info!(
            tree = %name,
            user = %requester.username,
            bindings = desired.len(),
            "authorized FolderTree deletion"
        );
        Ok(())
    }
}

async fn authorize(
    client: &dyn DryRunBindings,
    tree: &str,
    op: &BindingOperation,
) -> Result<(), Error> {
    let result = match (op.kind, op.existing.as_ref(), op.desired.as_ref()) {
        (OperationKind::Create, _, Some(desired)) => {
            dry_run_create_renamed(client, tree, &op.template, desired.clone()).await
        }
        (OperationKind::Update, Some(existing), Some(desired)) => {
            let updated = refreshed(existing, desired);
            match client.dry_run_replace(&updated).await {
                // Never created, e.g. its namespace does not exist yet
                Err(e) if e.is_not_found() => {
                    debug!(operation = %op, "binding not found, checking as a create");
                    dry_run_create_renamed(client, tree, &op.template, updated).await
                }
                other => other,
            }
        }
        (OperationKind::Delete, _, _) => {
            dry_run_delete(client, &op.namespace, &op.binding_name()).await
        }
        _ => Err(Error::internal_with_context(
            "webhook",
            format!("{op} is missing its RoleBinding"),
        )),
    };

    result.map_err(|e| escalation(op.kind, &op.namespace, &op.binding_name(), &op.template, &e))
}

/// Dry-run create of `binding` under a name that cannot collide
async fn dry_run_create_renamed(
    client: &dyn DryRunBindings,
    tree: &str,
    template: &str,
    mut binding: RoleBinding,
) -> Result<(), Error> {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    binding.metadata.name = Some(dry_run_binding_name(tree, template, nanos));
    binding.metadata.resource_version = None;
    binding.metadata.uid = None;
    client.dry_run_create(&binding).await
}

/// Dry-run delete where an already-missing binding counts as authorized
///
/// Authorization runs before the object lookup, so NotFound means the
/// requester passed it.
async fn dry_run_delete(
    client: &dyn DryRunBindings,
    namespace: &str,
    name: &str,
) -> Result<(), Error> {
    match client.dry_run_delete(namespace, name).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

fn escalation(
    kind: OperationKind,
    namespace: &str,
    binding: &str,
    template: &str,
    cause: &Error,
) -> Error {
    let message = match cause {
        Error::Kube {
            source: kube::Error::Api(response),
        } => response.message.clone(),
        other => other.to_string(),
    };
    warn!(
        operation = %kind,
        namespace,
        binding,
        template,
        reason = %message,
        "denied RoleBinding operation"
    );
    Error::PrivilegeEscalation {
        operation: kind.to_string(),
        namespace: namespace.to_string(),
        binding: binding.to_string(),
        template: template.to_string(),
        message,
    }
}
