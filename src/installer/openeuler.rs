// file: src/installer/openeuler.rs
// version: 1.2.0
// guid: 5a1d7e48-2f9c-4b36-8d0a-c39b6154fe72

//! openEuler family

use super::{common, NodeInstaller, Shell};
use crate::Result;
use async_trait::async_trait;

pub struct OpenEulerInstaller;

#[async_trait]
impl NodeInstaller for OpenEulerInstaller {
    fn name(&self) -> &'static str {
        "openeuler"
    }

    fn package_kind(&self) -> &'static str {
        "rpm"
    }

    async fn install_packages(&self, sh: &mut Shell<'_>, dir: &str) -> Result<()> {
        sh.run(&format!("dnf install -y --disablerepo='*' {}/*.rpm", dir))
            .await?;
        Ok(())
    }

    // ip_forward set only under sysctl.d does not survive a reboot here;
    // pin it in /etc/sysctl.conf as well.
    async fn configure_sysctl(&self, sh: &mut Shell<'_>) -> Result<()> {
        common::configure_sysctl(sh).await?;
        sh.run(
            "grep -q '^net.ipv4.ip_forward' /etc/sysctl.conf \
             || echo 'net.ipv4.ip_forward = 1' >> /etc/sysctl.conf",
        )
        .await?;
        sh.run("sysctl -p").await?;
        Ok(())
    }
}
