//! Error types for the folders operator
//!
//! Errors carry the FolderTree, folder, template and namespace they concern
//! so that status conditions and admission denials are actionable without
//! digging through logs.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for folders operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Malformed request or resource payload
    #[error("validation error for {tree}: {message}")]
    Validation {
        /// Name of the FolderTree being processed
        tree: String,
        /// Description of what's invalid
        message: String,
    },

    /// Two inheritance paths produced the same RoleBinding identity
    #[error(
        "inheritance conflict in {tree}: template '{template}' from folder '{folder}' \
         resolves to an existing RoleBinding in namespace '{namespace}'"
    )]
    InheritanceConflict {
        /// Name of the FolderTree
        tree: String,
        /// Folder whose emission collided
        folder: String,
        /// Template name shared by both emissions
        template: String,
        /// Namespace where both emissions land
        namespace: String,
    },

    /// The requester could not perform a RoleBinding operation themselves
    #[error(
        "privilege escalation prevented: failed to validate {operation} RoleBinding \
         '{binding}' in namespace '{namespace}' for template '{template}': {message}"
    )]
    PrivilegeEscalation {
        /// Operation kind (CREATE, UPDATE, DELETE)
        operation: String,
        /// Target namespace
        namespace: String,
        /// RoleBinding name
        binding: String,
        /// Template that produced the RoleBinding
        template: String,
        /// Reason reported by the API server
        message: String,
    },

    /// Building an impersonated client for the requester failed
    #[error("impersonation error for user {user}: {message}")]
    Impersonation {
        /// Username being impersonated
        user: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "webhook", "reconciler")
        context: String,
    },
}

impl Error {
    /// Create a validation error without tree context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            tree: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create an inheritance conflict error
    pub fn inheritance_conflict(
        tree: impl Into<String>,
        folder: impl Into<String>,
        template: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::InheritanceConflict {
            tree: tree.into(),
            folder: folder.into(),
            template: template.into(),
            namespace: namespace.into(),
        }
    }

    /// Create an impersonation error
    pub fn impersonation(user: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Impersonation {
            user: user.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Inheritance conflicts and malformed payloads need a spec change.
    /// Kubernetes errors are retried unless the API server answered with a
    /// 4xx other than 409 (stale write) or 429 (throttled).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae)
                    if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
            ),
            Error::Validation { .. } => false,
            Error::InheritanceConflict { .. } => false,
            Error::PrivilegeEscalation { .. } => false,
            Error::Impersonation { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// True when the API server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "Test".to_string(),
            code,
        }))
    }

    // ==========================================================================
    // Story Tests: Error Propagation Through Reconcile and Admission
    // ==========================================================================

    /// Story: A denied dry-run tells the user exactly which binding failed
    #[test]
    fn story_privilege_escalation_names_every_coordinate() {
        let err = Error::PrivilegeEscalation {
            operation: "CREATE".to_string(),
            namespace: "team-a".to_string(),
            binding: "foldertree-platform-admin".to_string(),
            template: "admin".to_string(),
            message: "rolebindings.rbac.authorization.k8s.io is forbidden".to_string(),
        };
        let msg = err.to_string();

        assert!(msg.starts_with("privilege escalation prevented: failed to validate CREATE"));
        assert!(msg.contains("'foldertree-platform-admin'"));
        assert!(msg.contains("namespace 'team-a'"));
        assert!(msg.contains("template 'admin'"));
        assert!(msg.ends_with("is forbidden"));
        assert!(!err.is_retryable());
    }

    /// Story: Inheritance conflicts fail closed and wait for a spec fix
    #[test]
    fn story_inheritance_conflict_is_permanent() {
        let err = Error::inheritance_conflict("platform", "child", "viewer", "ns1");
        assert!(err.to_string().contains("inheritance conflict in platform"));
        assert!(err.to_string().contains("folder 'child'"));
        assert!(matches!(err, Error::InheritanceConflict { ref tree, .. } if tree == "platform"));
        assert!(!err.is_retryable());
    }

    /// Story: Transient API failures are retried, client errors are not
    #[test]
    fn story_kube_errors_categorized_by_status_code() {
        assert!(api_error(500).is_retryable());
        assert!(api_error(503).is_retryable());
        assert!(!api_error(403).is_retryable());
        assert!(!api_error(422).is_retryable());
        assert!(api_error(409).is_retryable());
        assert!(api_error(429).is_retryable());
    }

    /// Story: NotFound is recognizable so deletes can be idempotent
    #[test]
    fn story_not_found_detection() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(409).is_not_found());
        assert!(!Error::validation("missing").is_not_found());
    }

    #[test]
    fn test_helpers_accept_str_and_string() {
        let err = Error::validation(String::from("bad payload"));
        assert!(matches!(err, Error::Validation { ref tree, .. } if tree == UNKNOWN_CONTEXT));
        assert!(!err.is_retryable());

        let err = Error::internal_with_context("webhook", format!("code {}", 7));
        assert_eq!(err.to_string(), "internal error [webhook]: code 7");
        assert!(err.is_retryable());

        let err = Error::serialization_for_kind("FolderTree", "missing field");
        assert!(matches!(err, Error::Serialization { kind: Some(ref k), .. } if k == "FolderTree"));
        assert!(Error::impersonation("alice", "bad header").is_retryable());
    }
}
