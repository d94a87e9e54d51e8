//! Workload addressing and remote command values.
//!
//! These types are plain data: constructing them never touches the cluster.
//! Only a [`crate::exec::RemoteExecutor`] performs effects.

use std::fmt;

use shell_escape::unix::escape;
use thiserror::Error;

/// How a workload is located within its namespace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WorkloadSelector {
    /// A concrete pod name.
    Name(String),
    /// A label selector such as `fabnctl/app=peer0.org1.org`.
    Labels(String),
}

impl fmt::Display for WorkloadSelector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => formatter.write_str(name),
            Self::Labels(labels) => write!(formatter, "[{labels}]"),
        }
    }
}

/// Identifies the workload (and optionally the container) an operation
/// targets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkloadRef {
    namespace: String,
    selector: WorkloadSelector,
    container: Option<String>,
}

/// Raised when a workload reference is missing a required part.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum WorkloadRefError {
    /// Raised when a required field is empty after trimming.
    #[error("missing or empty field: {0}")]
    Empty(&'static str),
    /// Raised when neither a name nor a label selector was supplied.
    #[error("a pod name or label selector is required")]
    MissingSelector,
}

impl WorkloadRef {
    /// Starts a builder for a [`WorkloadRef`].
    #[must_use]
    pub fn builder() -> WorkloadRefBuilder {
        WorkloadRefBuilder::default()
    }

    /// Namespace the workload lives in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Selector used to locate the workload.
    #[must_use]
    pub const fn selector(&self) -> &WorkloadSelector {
        &self.selector
    }

    /// Container to target inside the pod, if one was named.
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Returns a copy addressing the concrete pod `pod`, keeping the
    /// namespace and container.
    #[must_use]
    pub fn pinned(&self, pod: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            selector: WorkloadSelector::Name(pod.into()),
            container: self.container.clone(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "'{}' in namespace '{}'", self.selector, self.namespace)?;
        if let Some(container) = &self.container {
            write!(formatter, " (container '{container}')")?;
        }
        Ok(())
    }
}

/// Builder for [`WorkloadRef`] that trims and validates on
/// [`WorkloadRefBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct WorkloadRefBuilder {
    namespace: String,
    selector: Option<WorkloadSelector>,
    container: Option<String>,
}

impl WorkloadRefBuilder {
    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, value: impl Into<String>) -> Self {
        self.namespace = value.into();
        self
    }

    /// Targets a concrete pod by name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.selector = Some(WorkloadSelector::Name(value.into()));
        self
    }

    /// Targets the pods matching a label selector.
    #[must_use]
    pub fn labels(mut self, value: impl Into<String>) -> Self {
        self.selector = Some(WorkloadSelector::Labels(value.into()));
        self
    }

    /// Sets the container name.
    #[must_use]
    pub fn container(mut self, value: Option<String>) -> Self {
        self.container = value;
        self
    }

    /// Builds the reference.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadRefError`] when the namespace, selector or a named
    /// container is blank.
    pub fn build(self) -> Result<WorkloadRef, WorkloadRefError> {
        let namespace = self.namespace.trim().to_owned();
        if namespace.is_empty() {
            return Err(WorkloadRefError::Empty("namespace"));
        }

        let selector = match self.selector.ok_or(WorkloadRefError::MissingSelector)? {
            WorkloadSelector::Name(name) => WorkloadSelector::Name(non_blank(&name, "name")?),
            WorkloadSelector::Labels(labels) => {
                WorkloadSelector::Labels(non_blank(&labels, "labels")?)
            }
        };

        let container = self
            .container
            .map(|value| non_blank(&value, "container"))
            .transpose()?;

        Ok(WorkloadRef {
            namespace,
            selector,
            container,
        })
    }
}

fn non_blank(value: &str, field: &'static str) -> Result<String, WorkloadRefError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkloadRefError::Empty(field));
    }
    Ok(trimmed.to_owned())
}

/// A command to run inside a container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommand {
    tokens: Vec<String>,
    shell: bool,
    stdin: Option<Vec<u8>>,
}

impl RemoteCommand {
    /// Runs `tokens` as a plain argument vector.
    #[must_use]
    pub fn exec<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            shell: false,
            stdin: None,
        }
    }

    /// Runs `tokens` joined by spaces through `sh -c`, so environment
    /// variables such as `$ORDERER_CA` are expanded remotely.
    #[must_use]
    pub fn shell<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shell: true,
            ..Self::exec(tokens)
        }
    }

    /// Attaches bytes to feed to the remote process's stdin.
    #[must_use]
    pub fn with_stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Argument tokens as supplied.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether the command runs through a shell.
    #[must_use]
    pub const fn is_shell(&self) -> bool {
        self.shell
    }

    /// Bytes to write to stdin, if any.
    #[must_use]
    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// The argument vector to execute remotely.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        if self.shell {
            vec![String::from("sh"), String::from("-c"), self.tokens.join(" ")]
        } else {
            self.tokens.clone()
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shell {
            return formatter.write_str(&self.tokens.join(" "));
        }
        let rendered = self
            .tokens
            .iter()
            .map(|token| escape(token.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        formatter.write_str(&rendered)
    }
}

/// A command bound to the workload it runs in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecRequest {
    /// Where the command runs.
    pub target: WorkloadRef,
    /// What runs.
    pub command: RemoteCommand,
}

impl ExecRequest {
    /// Binds `command` to `target`.
    #[must_use]
    pub const fn new(target: WorkloadRef, command: RemoteCommand) -> Self {
        Self { target, command }
    }
}
