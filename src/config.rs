//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `fabnctl.toml` and `FABNCTL_*` environment
//! variables. The binary then applies its global flags on top.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::progress::Glyphs;

/// Deployment settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FABNCTL",
    discovery(
        app_name = "fabnctl",
        env_var = "FABNCTL_CONFIG_PATH",
        config_file_name = "fabnctl.toml",
        dotfile_name = ".fabnctl.toml",
        project_file_name = "fabnctl.toml"
    )
)]
pub struct FabnctlConfig {
    /// Namespace the network is deployed into.
    #[ortho_config(default = "network".to_owned())]
    pub namespace: String,
    /// Network domain, such as `example.com`. Required by every deployment.
    pub domain: Option<String>,
    /// Host name of the orderer within the domain.
    #[ortho_config(default = "orderer".to_owned())]
    pub orderer_hostname: String,
    /// Directory holding the Helm charts.
    #[ortho_config(default = "charts".to_owned())]
    pub charts_path: String,
    /// Root of the generated crypto material. Defaults to
    /// `.crypto-config.<domain>`.
    pub crypto_config_dir: Option<String>,
    /// Target CPU architecture; `arm64` selects ARM chart values.
    #[ortho_config(default = "amd64".to_owned())]
    pub target_arch: String,
    /// Path to the `kubectl` executable.
    #[ortho_config(default = "kubectl".to_owned())]
    pub kubectl_bin: String,
    /// Path to the `helm` executable.
    #[ortho_config(default = "helm".to_owned())]
    pub helm_bin: String,
    /// Kubeconfig context; the current context when unset.
    pub kube_context: Option<String>,
    /// Upper bound on chart installation, in seconds.
    #[ortho_config(default = 300)]
    pub install_timeout_secs: u64,
    /// Upper bound on waiting for each workload, in seconds.
    #[ortho_config(default = 180)]
    pub readiness_timeout_secs: u64,
    /// Interval between readiness checks, in milliseconds.
    #[ortho_config(default = 2000)]
    pub poll_interval_ms: u64,
    /// Glyph for successful steps.
    #[ortho_config(default = "✅".to_owned())]
    pub success_emoji: String,
    /// Glyph for already satisfied steps.
    #[ortho_config(default = "👌".to_owned())]
    pub ok_emoji: String,
    /// Glyph for failures.
    #[ortho_config(default = "❌".to_owned())]
    pub error_emoji: String,
    /// Glyph for warnings.
    #[ortho_config(default = "⚠️".to_owned())]
    pub warning_emoji: String,
    /// Glyph for informational lines.
    #[ortho_config(default = "ℹ️".to_owned())]
    pub info_emoji: String,
}

impl FabnctlConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("fabnctl")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies command-line overrides for the namespace and domain.
    #[must_use]
    pub fn with_overrides(mut self, namespace: Option<String>, domain: Option<String>) -> Self {
        if let Some(namespace) = namespace {
            self.namespace = namespace;
        }
        if domain.is_some() {
            self.domain = domain;
        }
        self
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and file key that provide each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is blank
    /// and [`ConfigError::Invalid`] when a duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.namespace, "namespace", "namespace")?;
        require(&self.orderer_hostname, "orderer host name", "orderer_hostname")?;
        require(&self.charts_path, "charts directory", "charts_path")?;
        require(&self.kubectl_bin, "kubectl executable", "kubectl_bin")?;
        require(&self.helm_bin, "helm executable", "helm_bin")?;
        require(&self.target_arch, "target architecture", "target_arch")?;
        non_zero(self.install_timeout_secs, "install_timeout_secs")?;
        non_zero(self.readiness_timeout_secs, "readiness_timeout_secs")?;
        non_zero(self.poll_interval_ms, "poll_interval_ms")?;
        Ok(())
    }

    /// The network domain.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no domain was configured.
    pub fn domain(&self) -> Result<&str, ConfigError> {
        let domain = self.domain.as_deref().unwrap_or_default();
        require(domain, "network domain", "domain")?;
        Ok(domain.trim())
    }

    /// Root of the crypto material for `domain`.
    #[must_use]
    pub fn crypto_config_dir(&self, domain: &str) -> Utf8PathBuf {
        self.crypto_config_dir.as_ref().map_or_else(
            || Utf8PathBuf::from(format!(".crypto-config.{domain}")),
            Utf8PathBuf::from,
        )
    }

    /// Orderer endpoint used by peers, `<host>.<domain>:443`.
    #[must_use]
    pub fn orderer_address(&self, domain: &str) -> String {
        format!("{}.{domain}:443", self.orderer_hostname)
    }

    /// Chart installation timeout.
    #[must_use]
    pub const fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    /// Per-workload readiness timeout.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Interval between readiness checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Glyphs for persisted progress lines.
    #[must_use]
    pub fn glyphs(&self) -> Glyphs {
        Glyphs {
            success: self.success_emoji.clone(),
            ok: self.ok_emoji.clone(),
            error: self.error_emoji.clone(),
            warning: self.warning_emoji.clone(),
            info: self.info_emoji.clone(),
        }
    }
}

fn require(value: &str, description: &str, key: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {description}: set FABNCTL_{} or add {key} to fabnctl.toml",
            key.to_ascii_uppercase()
        )));
    }
    Ok(())
}

fn non_zero(value: u64, key: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(())
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
