// file: src/installer/fedora.rs
// version: 1.2.0
// guid: 9f4c1e2b-8a5d-4f70-b3c9-0e6a2d815397

//! Fedora, CentOS and RHEL family

use super::{common, NodeInstaller, Shell};
use crate::Result;
use async_trait::async_trait;

pub struct FedoraInstaller;

#[async_trait]
impl NodeInstaller for FedoraInstaller {
    fn name(&self) -> &'static str {
        "fedora"
    }

    fn package_kind(&self) -> &'static str {
        "rpm"
    }

    async fn install_packages(&self, sh: &mut Shell<'_>, dir: &str) -> Result<()> {
        sh.run(&format!("dnf install -y --disablerepo='*' {}/*.rpm", dir))
            .await?;
        Ok(())
    }

    // Recent Fedora swaps on zram; a plain swapoff comes back on reboot
    // unless the generator package goes too.
    async fn disable_swap(&self, sh: &mut Shell<'_>) -> Result<()> {
        if sh.probe_ok("rpm -q zram-generator-defaults").await? {
            sh.run("dnf remove -y zram-generator-defaults").await?;
        }
        common::disable_swap(sh).await
    }
}
