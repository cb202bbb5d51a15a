// file: src/error.rs
// version: 1.2.0
// guid: 8c41f2aa-93d7-4b6e-ae15-0f27c3b9d4e1

use std::time::Duration;
use thiserror::Error;

/// Result type alias for the installer
pub type Result<T> = std::result::Result<T, InstallError>;

/// Error types for the offline Kubernetes installer
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("command `{command}` exited with code {code}: {output}")]
    Command {
        command: String,
        code: i32,
        output: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("cluster bootstrap error: {0}")]
    Bootstrap(String),

    #[error("registry authentication failed: {0}")]
    RegistryAuth(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("step '{step}' failed after {elapsed:?}: {source}")]
    Step {
        step: String,
        elapsed: Duration,
        #[source]
        source: Box<InstallError>,
    },

    #[error("node {ip} failed: {source}")]
    Node {
        ip: String,
        #[source]
        source: Box<InstallError>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl InstallError {
    /// Create a new SSH transport error
    pub fn ssh(msg: impl Into<String>) -> Self {
        Self::Ssh(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new cluster bootstrap error
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    /// Create a new registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Wrap an error with the step it occurred in
    pub fn in_step(step: &str, elapsed: Duration, source: InstallError) -> Self {
        Self::Step {
            step: step.to_string(),
            elapsed: Duration::from_millis(elapsed.as_millis() as u64),
            source: Box::new(source),
        }
    }

    /// Wrap an error with the node it occurred on
    pub fn on_node(ip: &str, source: InstallError) -> Self {
        Self::Node {
            ip: ip.to_string(),
            source: Box::new(source),
        }
    }

    /// True when the error means a remote command ran and exited non-zero,
    /// as opposed to the transport or the tool itself failing. Step checks
    /// treat this as "state not satisfied" rather than a fatal probe error.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::Command { .. })
    }
}
