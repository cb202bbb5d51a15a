// file: src/network/ssh.rs
// version: 1.3.0
// guid: a85e31f0-c9d2-47b6-9128-5e60d4b7af93

//! SSH client for remote node operations

use crate::error::InstallError;
use crate::network::RemoteExecutor;
use crate::Result;
use async_trait::async_trait;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// SSH connection to one node, password-authenticated
pub struct SshClient {
    session: Option<Session>,
    host: String,
}

impl SshClient {
    /// Connect to a node and authenticate
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        info!("Connecting to {}:{} as {}", host, port, username);

        let addr: SocketAddr = (host, port)
            .to_socket_addrs()
            .map_err(|e| InstallError::Ssh(format!("Failed to resolve {}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| InstallError::Ssh(format!("No address for {}:{}", host, port)))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| InstallError::Ssh(format!("Failed to connect to {}: {}", host, e)))?;

        let mut session = Session::new()
            .map_err(|e| InstallError::Ssh(format!("Failed to create SSH session: {}", e)))?;

        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| InstallError::Ssh(format!("SSH handshake with {} failed: {}", host, e)))?;

        session
            .userauth_password(username, password)
            .map_err(|e| InstallError::Ssh(format!("SSH authentication to {} failed: {}", host, e)))?;

        if !session.authenticated() {
            return Err(InstallError::Ssh(format!(
                "SSH authentication to {} failed",
                host
            )));
        }

        info!("SSH connection established to {}", host);
        Ok(Self {
            session: Some(session),
            host: host.to_string(),
        })
    }

    /// Run a command and collect exit status plus combined output
    fn exec(&mut self, command: &str) -> Result<(i32, String)> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| InstallError::ssh("No active SSH session"))?;

        let mut channel = session
            .channel_session()
            .map_err(|e| InstallError::Ssh(format!("Failed to create SSH channel: {}", e)))?;

        channel
            .exec(command)
            .map_err(|e| InstallError::Ssh(format!("Failed to execute command: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        channel
            .read_to_string(&mut stdout)
            .map_err(|e| InstallError::Ssh(format!("Failed to read stdout: {}", e)))?;
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| InstallError::Ssh(format!("Failed to read stderr: {}", e)))?;

        channel
            .wait_close()
            .map_err(|e| InstallError::Ssh(format!("Failed to close SSH channel: {}", e)))?;

        let exit_status = channel
            .exit_status()
            .map_err(|e| InstallError::Ssh(format!("Failed to get exit status: {}", e)))?;

        let mut combined = stdout;
        combined.push_str(&stderr);
        Ok((exit_status, combined))
    }

    /// Disconnect SSH session
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "", None);
            debug!("SSH session to {} disconnected", self.host);
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshClient {
    async fn run_command(&mut self, command: &str) -> Result<String> {
        debug!("[{}] executing: {}", self.host, command);

        let (exit_status, output) = self.exec(command)?;
        let output = output.trim().to_string();

        if exit_status != 0 {
            return Err(InstallError::Command {
                command: command.to_string(),
                code: exit_status,
                output,
            });
        }

        Ok(output)
    }

    async fn write_file(&mut self, remote_path: &str, data: &[u8]) -> Result<()> {
        debug!(
            "[{}] uploading {} bytes to {}",
            self.host,
            data.len(),
            remote_path
        );

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| InstallError::ssh("No active SSH session"))?;

        let mut remote_file = session
            .scp_send(std::path::Path::new(remote_path), 0o644, data.len() as u64, None)
            .map_err(|e| InstallError::Ssh(format!("Failed to create SCP channel: {}", e)))?;

        remote_file
            .write_all(data)
            .map_err(|e| InstallError::Ssh(format!("Failed to write file data: {}", e)))?;

        remote_file
            .send_eof()
            .map_err(|e| InstallError::Ssh(format!("Failed to send EOF: {}", e)))?;
        remote_file
            .wait_eof()
            .map_err(|e| InstallError::Ssh(format!("Failed to wait for EOF: {}", e)))?;
        remote_file
            .close()
            .map_err(|e| InstallError::Ssh(format!("Failed to close remote file: {}", e)))?;
        remote_file
            .wait_close()
            .map_err(|e| InstallError::Ssh(format!("Failed to wait for close: {}", e)))?;

        Ok(())
    }
}

impl Drop for SshClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
