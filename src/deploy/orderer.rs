//! Orderer deployment: TLS secrets followed by the orderer chart.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::info;

use crate::cancel::Cancellation;
use crate::helm::{ChartInstaller, ChartSpec};
use crate::progress::{Level, ProgressDecorator, ProgressSink};
use crate::secrets::{SecretKind, SecretSpec, SecretStore};

use super::DeployError;

/// Parameters of an orderer deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrdererDeployment {
    /// Orderer host name, such as `orderer`.
    pub hostname: String,
    /// Network domain, such as `example.com`.
    pub domain: String,
    /// Namespace to deploy into.
    pub namespace: String,
    /// Root of the generated crypto material.
    pub crypto_config_dir: Utf8PathBuf,
    /// Directory holding the charts.
    pub charts_path: Utf8PathBuf,
    /// Target architecture; `arm64` selects the ARM values file.
    pub target_arch: String,
    /// Upper bound on the chart installation.
    pub install_timeout: Duration,
}

impl OrdererDeployment {
    /// Fully qualified orderer host, such as `orderer.example.com`.
    #[must_use]
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.hostname, self.domain)
    }

    /// Directory holding the orderer's TLS files.
    #[must_use]
    pub fn tls_dir(&self) -> Utf8PathBuf {
        self.crypto_config_dir
            .join("ordererOrganizations")
            .join(&self.domain)
            .join("orderers")
            .join(self.fqdn())
            .join("tls")
    }

    /// Secrets to create from `material`: the TLS key pair, then the CA.
    #[must_use]
    pub fn secrets(&self, material: &TlsMaterial) -> [SecretSpec; 2] {
        let fqdn = self.fqdn();
        [
            SecretSpec {
                name: format!("{fqdn}-tls"),
                namespace: self.namespace.clone(),
                kind: SecretKind::Tls,
                data: BTreeMap::from([
                    (String::from("tls.key"), material.private_key.clone()),
                    (String::from("tls.crt"), material.certificate.clone()),
                ]),
                labels: self.labels("orderer.tls.secret"),
            },
            SecretSpec {
                name: format!("{fqdn}-ca"),
                namespace: self.namespace.clone(),
                kind: SecretKind::Opaque,
                data: BTreeMap::from([(String::from("ca.crt"), material.ca_certificate.clone())]),
                labels: self.labels("orderer.ca.secret"),
            },
        ]
    }

    fn labels(&self, cid: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (String::from("fabnctl/cid"), cid.to_owned()),
            (String::from("fabnctl/domain"), self.domain.clone()),
            (String::from("fabnctl/host"), self.hostname.clone()),
        ])
    }

    /// The orderer chart release.
    #[must_use]
    pub fn chart(&self) -> ChartSpec {
        let chart = self.charts_path.join("orderer");
        let values_files = if self.target_arch == "arm64" {
            vec![chart.join("values.arm64.yaml")]
        } else {
            Vec::new()
        };
        ChartSpec {
            release: String::from("orderer"),
            chart,
            namespace: self.namespace.clone(),
            values_files,
            set_values: vec![(String::from("domain"), self.domain.clone())],
            wait: true,
            timeout: self.install_timeout,
        }
    }
}

/// TLS key material of one orderer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TlsMaterial {
    /// PEM private key (`server.key`).
    pub private_key: Vec<u8>,
    /// PEM certificate (`server.crt`).
    pub certificate: Vec<u8>,
    /// PEM CA certificate (`ca.crt`).
    pub ca_certificate: Vec<u8>,
}

impl TlsMaterial {
    /// Reads `server.key`, `server.crt` and `ca.crt` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Material`] naming the file that could not be
    /// read.
    pub fn read(dir: &Utf8Path) -> Result<Self, DeployError> {
        let handle = Dir::open_ambient_dir(dir, ambient_authority()).map_err(|err| {
            DeployError::Material {
                what: "TLS directory",
                path: dir.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        let read = |file: &str, what: &'static str| {
            handle.read(file).map_err(|err| DeployError::Material {
                what,
                path: dir.join(file),
                message: err.to_string(),
            })
        };
        Ok(Self {
            private_key: read("server.key", "private key")?,
            certificate: read("server.crt", "certificate identity")?,
            ca_certificate: read("ca.crt", "certificate CA")?,
        })
    }
}

/// Creates the orderer's secrets and installs its chart.
pub struct OrdererDeployer<S, C> {
    secrets: S,
    charts: C,
    decorator: ProgressDecorator,
    sink: Arc<dyn ProgressSink>,
}

impl<S, C> std::fmt::Debug for OrdererDeployer<S, C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OrdererDeployer")
            .field("decorator", &self.decorator)
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore, C: ChartInstaller> OrdererDeployer<S, C> {
    /// Creates a deployer.
    #[must_use]
    pub fn new(secrets: S, charts: C, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            secrets,
            charts,
            decorator: ProgressDecorator::new(Arc::clone(&sink)),
            sink,
        }
    }

    /// Deploys the orderer. Re-running updates the secrets and upgrades the
    /// release in place.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Material`] when the TLS files cannot be read,
    /// [`DeployError::Secret`] when a secret cannot be applied and
    /// [`DeployError::Chart`] when the chart installation fails or exceeds
    /// its timeout.
    pub async fn deploy(
        &self,
        deployment: &OrdererDeployment,
        cancel: &Cancellation,
    ) -> Result<(), DeployError> {
        let material = TlsMaterial::read(&deployment.tls_dir())?;

        for secret in deployment.secrets(&material) {
            self.secrets
                .apply(&secret, cancel)
                .await
                .map_err(|source| DeployError::Secret {
                    name: secret.name.clone(),
                    source,
                })?;
            self.sink.persist(
                Level::Success,
                &format!("Secret '{}' successfully created", secret.name),
            );
        }

        let chart = deployment.chart();
        let install_cancel = cancel.with_timeout(deployment.install_timeout);
        self.decorator
            .decorate(
                "Installing orderer chart",
                "Chart 'orderer/orderer' installed successfully",
                self.charts.install_or_upgrade(&chart, &install_cancel),
            )
            .await
            .map_err(DeployError::Chart)?;

        info!(orderer = %deployment.fqdn(), "orderer deployed");
        Ok(())
    }
}
