// file: src/installer/ubuntu.rs
// version: 1.2.0
// guid: 2c8e5f91-6b3a-4d27-a05c-7f1d94e6b820

//! Ubuntu and Debian family

use super::{NodeInstaller, Shell};
use crate::Result;
use async_trait::async_trait;

pub struct UbuntuInstaller;

#[async_trait]
impl NodeInstaller for UbuntuInstaller {
    fn name(&self) -> &'static str {
        "ubuntu"
    }

    fn package_kind(&self) -> &'static str {
        "deb"
    }

    async fn install_packages(&self, sh: &mut Shell<'_>, dir: &str) -> Result<()> {
        sh.run(&format!("dpkg -i {}/*.deb", dir)).await?;
        Ok(())
    }

    // No SELinux on Debian-family installs
    async fn check_selinux(&self, _sh: &mut Shell<'_>) -> Result<bool> {
        Ok(true)
    }

    async fn disable_selinux(&self, _sh: &mut Shell<'_>) -> Result<()> {
        Ok(())
    }

    async fn check_firewall(&self, sh: &mut Shell<'_>) -> Result<bool> {
        match sh.probe("ufw status").await? {
            Some(out) => Ok(out.contains("inactive")),
            None => Ok(true),
        }
    }

    async fn disable_firewall(&self, sh: &mut Shell<'_>) -> Result<()> {
        sh.run("ufw disable").await?;
        Ok(())
    }
}
