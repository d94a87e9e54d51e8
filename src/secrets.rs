//! Kubernetes secrets described as data and applied through a
//! [`SecretStore`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::{Value, json};
use thiserror::Error;

use crate::cancel::Cancellation;
use crate::process::ProcessError;

/// Kind of secret to create.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecretKind {
    /// `kubernetes.io/tls`, holding `tls.key` and `tls.crt`.
    Tls,
    /// `Opaque`, arbitrary keys.
    Opaque,
}

impl SecretKind {
    /// Type string used in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tls => "kubernetes.io/tls",
            Self::Opaque => "Opaque",
        }
    }
}

/// A secret to create or update.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecretSpec {
    /// Secret name.
    pub name: String,
    /// Namespace the secret lives in.
    pub namespace: String,
    /// Secret type.
    pub kind: SecretKind,
    /// Payload keyed by file name. Any bytes: PEM, DER or bundles.
    pub data: BTreeMap<String, Vec<u8>>,
    /// Labels attached to the secret.
    pub labels: BTreeMap<String, String>,
}

impl SecretSpec {
    /// Renders the manifest passed to `kubectl apply`. Payloads are opaque
    /// bytes and travel base64-encoded under `data`.
    #[must_use]
    pub fn manifest(&self) -> Value {
        let data: serde_json::Map<String, Value> = self
            .data
            .iter()
            .map(|(key, bytes)| (key.clone(), Value::String(BASE64_STANDARD.encode(bytes))))
            .collect();
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "type": self.kind.as_str(),
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": self.labels,
            },
            "data": data,
        })
    }
}

/// Errors raised while applying a secret.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SecretError {
    /// Raised when the manifest cannot be serialised.
    #[error("failed to encode secret manifest: {0}")]
    Encode(String),
    /// Raised when the apply command could not be run.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// Raised when the apply command exits unsuccessfully.
    #[error("applying secret {name} exited with status {status}: {stderr}")]
    CommandFailure {
        /// Secret name.
        name: String,
        /// Exit status rendered for display.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Future returned by [`SecretStore::apply`].
pub type SecretFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SecretError>> + Send + 'a>>;

/// Creates or updates secrets. Applying the same spec twice is a no-op.
pub trait SecretStore: Send + Sync {
    /// Creates `secret`, or updates it in place when it exists.
    fn apply<'a>(&'a self, secret: &'a SecretSpec, cancel: &'a Cancellation) -> SecretFuture<'a>;
}
