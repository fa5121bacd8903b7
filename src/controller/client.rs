//! Kubernetes API seam for the FolderTree controller

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::{FolderTree, FolderTreeStatus};
use crate::rbac::tree_selector;
use crate::{Error, FIELD_MANAGER};

/// Trait abstracting the Kubernetes calls the controller makes
///
/// Real clusters go through [`FolderTreeKubeClientImpl`]; tests use the
/// generated `MockFolderTreeKubeClient`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FolderTreeKubeClient: Send + Sync {
    /// List every RoleBinding labelled with `tree`, across namespaces
    async fn list_tree_bindings(&self, tree: &str) -> Result<Vec<RoleBinding>, Error>;

    /// Whether namespace `name` exists
    async fn namespace_exists(&self, name: &str) -> Result<bool, Error>;

    /// Create a RoleBinding
    async fn create_binding(&self, binding: &RoleBinding) -> Result<(), Error>;

    /// Replace a RoleBinding with `binding`
    async fn replace_binding(&self, binding: &RoleBinding) -> Result<(), Error>;

    /// Delete a RoleBinding
    async fn delete_binding(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Patch the status subresource of a FolderTree
    async fn patch_status(&self, name: &str, status: &FolderTreeStatus) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct FolderTreeKubeClientImpl {
    client: Client,
}

impl FolderTreeKubeClientImpl {
    /// Wrap a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn bindings_in(&self, binding: &RoleBinding) -> Result<Api<RoleBinding>, Error> {
        let namespace = binding
            .namespace()
            .ok_or_else(|| {
                Error::validation(format!("RoleBinding {} has no namespace", binding.name_any()))
            })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl FolderTreeKubeClient for FolderTreeKubeClientImpl {
    async fn list_tree_bindings(&self, tree: &str) -> Result<Vec<RoleBinding>, Error> {
        let api: Api<RoleBinding> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default().labels(&tree_selector(tree))).await?;
        Ok(list.items)
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn create_binding(&self, binding: &RoleBinding) -> Result<(), Error> {
        let api = self.bindings_in(binding)?;
        api.create(&PostParams::default(), binding).await?;
        Ok(())
    }

    async fn replace_binding(&self, binding: &RoleBinding) -> Result<(), Error> {
        let api = self.bindings_in(binding)?;
        api.replace(&binding.name_any(), &PostParams::default(), binding)
            .await?;
        Ok(())
    }

    async fn delete_binding(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn patch_status(&self, name: &str, status: &FolderTreeStatus) -> Result<(), Error> {
        let api: Api<FolderTree> = Api::all(self.client.clone());
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&status_patch))
            .await?;
        Ok(())
    }
}
