// file: src/network/local.rs
// version: 1.1.0
// guid: 5b28f9c4-e016-4d7a-93c5-1a84d62e0b79

//! Local command execution for operator-machine work
//!
//! The registry sync engine pulls, retags and pushes images on the machine
//! running the installer; this shell gives it the same interface nodes get.

use crate::error::InstallError;
use crate::network::RemoteExecutor;
use crate::Result;
use async_trait::async_trait;
use tracing::debug;

/// Local executor over `bash -lc`, mimicking the SSH client interface
pub struct LocalShell;

impl LocalShell {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for LocalShell {
    async fn run_command(&mut self, command: &str) -> Result<String> {
        debug!("[local] executing: {}", command);

        let output = tokio::process::Command::new("bash")
            .arg("-lc")
            .arg(command)
            .output()
            .await
            .map_err(|e| InstallError::Ssh(format!("Failed to spawn local command: {}", e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();

        if !output.status.success() {
            return Err(InstallError::Command {
                command: command.to_string(),
                code: output.status.code().unwrap_or(-1),
                output: combined,
            });
        }

        Ok(combined)
    }

    async fn write_file(&mut self, remote_path: &str, data: &[u8]) -> Result<()> {
        tokio::fs::write(remote_path, data).await?;
        Ok(())
    }
}
