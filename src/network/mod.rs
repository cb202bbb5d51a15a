// file: src/network/mod.rs
// version: 1.2.0
// guid: 3d90a7c2-58e4-4f1b-86d3-b742c09e5f18

//! Remote and local command execution
//!
//! Every remote action in the installer goes through [`RemoteExecutor`]:
//! one logical channel per node, commands strictly sequential on it.
//! Production code dials nodes with [`SshConnector`]; tests substitute a
//! scripted executor behind the same traits.

pub mod local;
pub mod ssh;

pub use local::LocalShell;
pub use ssh::SshClient;

use crate::config::{Architecture, ClusterSpec, NodeSpec};
use crate::Result;
use async_trait::async_trait;

/// Command execution on one node
///
/// `run_command` returns combined stdout+stderr; a non-zero exit becomes an
/// [`InstallError::Command`](crate::error::InstallError::Command) carrying
/// the exit code and output, so callers can tell "ran and said no" apart
/// from transport failures.
#[async_trait]
pub trait RemoteExecutor: Send {
    async fn run_command(&mut self, command: &str) -> Result<String>;

    async fn write_file(&mut self, remote_path: &str, data: &[u8]) -> Result<()>;

    async fn detect_arch(&mut self) -> Result<Architecture> {
        let output = self.run_command("uname -m").await?;
        output.trim().parse()
    }
}

impl std::fmt::Debug for dyn RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RemoteExecutor")
    }
}

/// Dials a node and yields its executor connection
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ClusterSpec, node: &NodeSpec) -> Result<Box<dyn RemoteExecutor>>;
}

/// Production connector: SSH password auth per node spec
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, spec: &ClusterSpec, node: &NodeSpec) -> Result<Box<dyn RemoteExecutor>> {
        let client = SshClient::connect(
            &node.ip,
            spec.node_port(node),
            spec.node_user(node),
            &node.password,
            spec.command_timeout(),
        )
        .await?;
        Ok(Box::new(client))
    }
}
