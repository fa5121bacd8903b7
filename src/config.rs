//! Operator configuration
//!
//! Command-line flags (with environment fallbacks) resolve into an
//! [`OperatorConfig`] consumed by the controller binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, ValueEnum};

use crate::webhook::DEFAULT_TRUSTED_IDENTITIES;

/// Default webhook listen address
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:9443";
/// Default directory holding the webhook serving certificate
pub const DEFAULT_CERT_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";
/// Certificate file name inside the cert directory
pub const CERT_FILE: &str = "tls.crt";
/// Private key file name inside the cert directory
pub const KEY_FILE: &str = "tls.key";

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

/// Where and how the admission webhook listens
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Listen address
    pub addr: SocketAddr,
    /// Directory containing `tls.crt` and `tls.key`
    pub cert_dir: PathBuf,
}

impl WebhookConfig {
    /// Path of the serving certificate
    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(CERT_FILE)
    }

    /// Path of the serving key
    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(KEY_FILE)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9443)),
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
        }
    }
}

/// Resolved operator configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Admission webhook settings, `None` when the webhook is disabled
    pub webhook: Option<WebhookConfig>,
    /// Identities that may delete FolderTrees without the per-binding check
    pub trusted_identities: Vec<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            webhook: Some(WebhookConfig::default()),
            trusted_identities: DEFAULT_TRUSTED_IDENTITIES.iter().map(|s| s.to_string()).collect(),
            log_format: LogFormat::default(),
        }
    }
}

/// Controller flags
///
/// Global so they can be given with or without the `controller` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Admission webhook listen address
    #[arg(long, global = true, env = "FOLDERS_WEBHOOK_ADDR", default_value = DEFAULT_WEBHOOK_ADDR)]
    pub webhook_addr: SocketAddr,

    /// Directory containing the webhook's tls.crt and tls.key
    #[arg(long, global = true, env = "FOLDERS_CERT_DIR", default_value = DEFAULT_CERT_DIR)]
    pub cert_dir: PathBuf,

    /// Identity allowed to delete FolderTrees unchecked (repeatable)
    ///
    /// Defaults to the controller service account and system:admin.
    #[arg(
        long = "trusted-identity",
        global = true,
        env = "FOLDERS_TRUSTED_IDENTITIES",
        value_delimiter = ','
    )]
    pub trusted_identities: Vec<String>,

    /// Run without the admission webhook
    #[arg(long, global = true)]
    pub disable_webhook: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl ControllerArgs {
    /// Resolve flags into an [`OperatorConfig`]
    pub fn into_config(self) -> OperatorConfig {
        let webhook = (!self.disable_webhook).then(|| WebhookConfig {
            addr: self.webhook_addr,
            cert_dir: self.cert_dir,
        });
        let trusted_identities = if self.trusted_identities.is_empty() {
            OperatorConfig::default().trusted_identities
        } else {
            self.trusted_identities
        };

        OperatorConfig {
            webhook,
            trusted_identities,
            log_format: self.log_format,
        }
    }
}
