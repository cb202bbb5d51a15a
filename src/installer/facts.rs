// file: src/installer/facts.rs
// version: 1.0.0
// guid: c637d1e9-40f2-4b85-a1c7-39be8d52f604

//! Node environment probe
//!
//! One combined command fetches everything installer selection and step
//! planning need, so a fresh node costs two round-trips (arch + probe).

use crate::config::Architecture;
use crate::error::InstallError;
use crate::network::RemoteExecutor;
use crate::Result;

/// What we learned about a node before planning its steps
#[derive(Debug, Clone)]
pub struct NodeFacts {
    pub arch: Architecture,
    pub os_name: String,
    pub os_version: String,
    pub kernel: String,
    pub has_gpu: bool,
    pub has_npu: bool,
}

const PROBE_COMMAND: &str = concat!(
    ". /etc/os-release && echo \"${NAME}|${VERSION_ID}|$(uname -r)|",
    "$(lspci 2>/dev/null | grep -iq nvidia && echo true || echo false)|",
    "$(lspci 2>/dev/null | grep -iq 'Processing accelerators.*Huawei' && echo true || echo false)\""
);

/// Probe a node's architecture, OS release and accelerator presence
pub async fn probe_node(exec: &mut dyn RemoteExecutor) -> Result<NodeFacts> {
    let arch = exec.detect_arch().await?;
    let output = exec.run_command(PROBE_COMMAND).await?;

    let line = output.trim();
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != 5 {
        return Err(InstallError::UnsupportedOs(format!(
            "unexpected environment probe output: {}",
            line
        )));
    }

    Ok(NodeFacts {
        arch,
        os_name: fields[0].trim().to_string(),
        os_version: fields[1].trim().to_string(),
        kernel: fields[2].trim().to_string(),
        has_gpu: fields[3].trim() == "true",
        has_npu: fields[4].trim() == "true",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeShell;

    #[tokio::test]
    async fn test_probe_node_parses_fields() {
        let mut shell = FakeShell::new()
            .ok("os-release", "Ubuntu|22.04|5.15.0-56-generic|false|true");

        let facts = probe_node(&mut shell).await.unwrap();
        assert_eq!(facts.arch, Architecture::Amd64);
        assert_eq!(facts.os_name, "Ubuntu");
        assert_eq!(facts.os_version, "22.04");
        assert_eq!(facts.kernel, "5.15.0-56-generic");
        assert!(!facts.has_gpu);
        assert!(facts.has_npu);
    }

    #[tokio::test]
    async fn test_probe_node_rejects_garbage() {
        let mut shell = FakeShell::new().ok("os-release", "what even is this");
        let err = probe_node(&mut shell).await.unwrap_err();
        assert!(matches!(err, InstallError::UnsupportedOs(_)));
    }
}
