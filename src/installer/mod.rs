// file: src/installer/mod.rs
// version: 1.2.0
// guid: e159c8b7-3a64-4d20-bf91-7c28e6a05d43

//! OS-family installer capability
//!
//! Core code never branches on an OS name. It probes `/etc/os-release`
//! once, selects a [`NodeInstaller`] for the family, and calls through the
//! trait. Recipes shared by every family live as default methods; the
//! family impls override only where package managers or platform quirks
//! actually differ.

pub mod common;
pub mod facts;
pub mod fedora;
pub mod openeuler;
pub mod ubuntu;

pub use facts::{probe_node, NodeFacts};
pub use fedora::FedoraInstaller;
pub use openeuler::OpenEulerInstaller;
pub use ubuntu::UbuntuInstaller;

use crate::config::{Architecture, ClusterSpec, VersionPins, REMOTE_STAGING_DIR};
use crate::error::InstallError;
use crate::network::RemoteExecutor;
use crate::Result;
use async_trait::async_trait;

/// Version string with dots replaced by dashes, as used in bundle paths
pub fn dashed(version: &str) -> String {
    version.replace('.', "-")
}

/// Execution context handed to installer methods: the node's executor plus
/// the facts and spec needed to build command lines and asset paths.
pub struct Shell<'a> {
    exec: &'a mut dyn RemoteExecutor,
    pub facts: &'a NodeFacts,
    pub spec: &'a ClusterSpec,
}

impl<'a> Shell<'a> {
    pub fn new(exec: &'a mut dyn RemoteExecutor, facts: &'a NodeFacts, spec: &'a ClusterSpec) -> Self {
        Self { exec, facts, spec }
    }

    /// Run a command, propagating every failure
    pub async fn run(&mut self, command: &str) -> Result<String> {
        self.exec.run_command(command).await
    }

    /// Run a probe command. A non-zero exit means "state not satisfied" and
    /// maps to `Ok(None)`; transport errors stay fatal.
    pub async fn probe(&mut self, command: &str) -> Result<Option<String>> {
        match self.exec.run_command(command).await {
            Ok(output) => Ok(Some(output)),
            Err(e) if e.is_command_failure() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Probe and report whether the command succeeded
    pub async fn probe_ok(&mut self, command: &str) -> Result<bool> {
        Ok(self.probe(command).await?.is_some())
    }

    /// Probe and report whether the output contains `needle`
    pub async fn probe_contains(&mut self, command: &str, needle: &str) -> Result<bool> {
        Ok(self
            .probe(command)
            .await?
            .map(|out| out.contains(needle))
            .unwrap_or(false))
    }

    pub async fn write_file(&mut self, remote_path: &str, data: &[u8]) -> Result<()> {
        self.exec.write_file(remote_path, data).await
    }

    pub fn arch(&self) -> Architecture {
        self.facts.arch
    }

    pub fn versions(&self) -> &VersionPins {
        &self.spec.versions
    }

    pub fn staging(&self) -> &'static str {
        REMOTE_STAGING_DIR
    }

    /// `<staging>/<tool>/<arch>/<version-dashed>`
    pub fn versioned_dir(&self, tool: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            REMOTE_STAGING_DIR,
            tool,
            self.facts.arch.as_str(),
            dashed(version)
        )
    }

    /// `<staging>/<component>/<arch>/<kind>` for OS package directories
    pub fn package_dir(&self, component: &str, kind: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            REMOTE_STAGING_DIR,
            component,
            self.facts.arch.as_str(),
            kind
        )
    }
}

/// Check/apply pairs one OS family must provide.
///
/// Checks return `Ok(true)` when the state is already satisfied. They may
/// probe remote state but never change it; every mutation belongs to the
/// apply side.
#[async_trait]
pub trait NodeInstaller: Send + Sync {
    fn name(&self) -> &'static str;

    /// OS package extension, `rpm` or `deb`, keyed into bundle paths
    fn package_kind(&self) -> &'static str;

    /// Install every package file in a bundle directory offline
    async fn install_packages(&self, sh: &mut Shell<'_>, dir: &str) -> Result<()>;

    async fn check_selinux(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_selinux_disabled(sh).await
    }
    async fn disable_selinux(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::disable_selinux(sh).await
    }

    async fn check_firewall(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_firewalld_inactive(sh).await
    }
    async fn disable_firewall(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::disable_firewalld(sh).await
    }

    async fn check_swap(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_swap_off(sh).await
    }
    async fn disable_swap(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::disable_swap(sh).await
    }

    async fn check_kernel_modules(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_kernel_modules(sh).await
    }
    async fn load_kernel_modules(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::load_kernel_modules(sh).await
    }

    async fn check_sysctl(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_sysctl(sh).await
    }
    async fn configure_sysctl(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::configure_sysctl(sh).await
    }

    async fn check_common_tools(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_common_tools(sh).await
    }
    async fn install_common_tools(&self, sh: &mut Shell<'_>) -> Result<()> {
        let dir = sh.package_dir("tools", self.package_kind());
        self.install_packages(sh, &dir).await
    }

    async fn check_docker(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_docker(sh).await
    }
    async fn install_docker(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::install_docker(sh).await
    }

    async fn check_runtime_binaries(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_runtime_binaries(sh).await
    }
    async fn install_runtime_binaries(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::install_runtime_binaries(sh).await
    }

    async fn check_containerd_service(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_containerd_service(sh).await
    }
    async fn configure_containerd_service(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::configure_containerd_service(sh).await
    }

    async fn check_containerd_running(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_containerd_running(sh).await
    }
    async fn start_containerd(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::start_containerd(sh).await
    }

    async fn check_crictl(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_crictl(sh).await
    }
    async fn configure_crictl(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::configure_crictl(sh).await
    }

    async fn check_nerdctl(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_nerdctl(sh).await
    }
    async fn install_nerdctl(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::install_nerdctl(sh).await
    }

    async fn check_haproxy(&self, sh: &mut Shell<'_>) -> Result<bool> {
        sh.probe_ok("command -v haproxy").await
    }
    async fn install_haproxy(&self, sh: &mut Shell<'_>) -> Result<()> {
        let dir = sh.package_dir("haproxy", self.package_kind());
        self.install_packages(sh, &dir).await
    }

    async fn check_keepalived(&self, sh: &mut Shell<'_>) -> Result<bool> {
        sh.probe_ok("command -v keepalived").await
    }
    async fn install_keepalived(&self, sh: &mut Shell<'_>) -> Result<()> {
        let dir = sh.package_dir("keepalived", self.package_kind());
        self.install_packages(sh, &dir).await
    }

    async fn check_accelerator(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_accelerator(sh).await
    }
    async fn configure_accelerator(&self, sh: &mut Shell<'_>) -> Result<()> {
        if sh.facts.has_gpu {
            let dir = sh.package_dir("gpu", self.package_kind());
            self.install_packages(sh, &dir).await?;
            common::enable_nvidia_runtime(sh).await?;
        }
        if sh.facts.has_npu {
            let dir = sh.package_dir("npu", self.package_kind());
            self.install_packages(sh, &dir).await?;
            common::enable_ascend_runtime(sh).await?;
        }
        Ok(())
    }

    async fn check_k8s_components(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_k8s_components(sh).await
    }
    async fn install_k8s_components(&self, sh: &mut Shell<'_>) -> Result<()> {
        let kind = self.package_kind();
        let version = sh.versions().kubernetes.clone();
        let dir = format!("{}/{}", sh.package_dir("k8s", kind), dashed(&version));
        self.install_packages(sh, &dir).await?;
        sh.run("systemctl enable kubelet").await?;
        Ok(())
    }

    async fn check_images_loaded(&self, sh: &mut Shell<'_>) -> Result<bool> {
        common::check_images_loaded(sh).await
    }
    async fn load_offline_images(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::load_offline_images(sh).await
    }
}

impl std::fmt::Debug for dyn NodeInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

static FEDORA: FedoraInstaller = FedoraInstaller;
static UBUNTU: UbuntuInstaller = UbuntuInstaller;
static OPENEULER: OpenEulerInstaller = OpenEulerInstaller;

/// Select the installer for an OS name from `/etc/os-release`.
/// Unrecognized systems are a hard error, never a silent default.
pub fn select_installer(os_name: &str) -> Result<&'static dyn NodeInstaller> {
    let name = os_name.to_lowercase();
    if name.contains("fedora") || name.contains("centos") || name.contains("red hat") {
        Ok(&FEDORA)
    } else if name.contains("ubuntu") || name.contains("debian") {
        Ok(&UBUNTU)
    } else if name.contains("openeuler") {
        Ok(&OPENEULER)
    } else {
        Err(InstallError::UnsupportedOs(os_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_installer_families() {
        assert_eq!(select_installer("Fedora Linux").unwrap().name(), "fedora");
        assert_eq!(select_installer("CentOS Stream").unwrap().name(), "fedora");
        assert_eq!(select_installer("Ubuntu").unwrap().name(), "ubuntu");
        assert_eq!(select_installer("Debian GNU/Linux").unwrap().name(), "ubuntu");
        assert_eq!(select_installer("openEuler").unwrap().name(), "openeuler");
    }

    #[test]
    fn test_select_installer_rejects_unknown() {
        let err = select_installer("TempleOS").unwrap_err();
        assert!(matches!(err, InstallError::UnsupportedOs(_)));
    }

    #[test]
    fn test_dashed_versions() {
        assert_eq!(dashed("2.2.1"), "2-2-1");
        assert_eq!(dashed("1.35.0"), "1-35-0");
    }
}
