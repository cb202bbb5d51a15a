// file: src/provision/bootstrap.rs
// version: 1.2.0
// guid: f82d4a16-3c97-4e50-b1d8-a65f20c93e74

//! kubeadm bootstrap: init the primary, join everyone else
//!
//! The primary master produces the join artifacts every later node
//! consumes; ordering is enforced by the scheduler, which runs masters
//! before workers and hands artifacts forward by value.

use crate::config::{ClusterSpec, LB_APISERVER_PORT};
use crate::error::InstallError;
use crate::installer::Shell;
use crate::Result;
use regex::Regex;

const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";
const KUBELET_KUBECONFIG: &str = "/etc/kubernetes/kubelet.conf";

/// Join commands produced by the primary master
#[derive(Debug, Clone)]
pub struct JoinArtifacts {
    /// Full `kubeadm join` line for workers
    pub worker_join: String,
    /// Worker join plus control-plane flags; present only in HA mode
    pub master_join: Option<String>,
}

impl JoinArtifacts {
    /// Artifacts seeded from a pre-shared join command in the config,
    /// used for fleets that have no master of their own
    pub fn from_config(spec: &ClusterSpec) -> Option<Self> {
        spec.join_command.as_ref().map(|cmd| Self {
            worker_join: cmd.clone(),
            master_join: None,
        })
    }
}

/// A node is bootstrapped when its kubeconfig exists: the admin one for
/// masters, the kubelet one for workers
pub async fn check_bootstrapped(sh: &mut Shell<'_>, is_master: bool) -> Result<bool> {
    let marker = if is_master {
        ADMIN_KUBECONFIG
    } else {
        KUBELET_KUBECONFIG
    };
    sh.probe_ok(&format!("test -f {}", marker)).await
}

/// The `kubeadm init` line for this cluster
pub fn kubeadm_init_command(spec: &ClusterSpec) -> String {
    let mut cmd = format!(
        "kubeadm init --v 0 --kubernetes-version=v{} --image-repository={}",
        spec.versions.kubernetes,
        spec.image_repository()
    );
    if spec.ha.enabled {
        cmd.push_str(&format!(
            " --control-plane-endpoint \"{}:{}\" --upload-certs",
            spec.virtual_ip_host(),
            LB_APISERVER_PORT
        ));
    }
    cmd
}

/// The certificate key is the last long hex token kubeadm prints;
/// everything before it is phase chatter.
pub fn extract_certificate_key(output: &str) -> Result<Option<String>> {
    let re = Regex::new(r"[a-f0-9]{32,64}")
        .map_err(|e| InstallError::bootstrap(format!("certificate key pattern: {}", e)))?;
    let lowered = output.to_lowercase();
    Ok(re
        .find_iter(&lowered)
        .last()
        .map(|m| m.as_str().to_string()))
}

async fn install_kubeconfig(sh: &mut Shell<'_>) -> Result<()> {
    sh.run(&format!(
        "mkdir -p $HOME/.kube && cp -f {} $HOME/.kube/config",
        ADMIN_KUBECONFIG
    ))
    .await?;
    Ok(())
}

/// Fresh join artifacts from an already-initialized control plane
pub async fn collect_join_artifacts(sh: &mut Shell<'_>) -> Result<JoinArtifacts> {
    let output = sh.run("kubeadm token create --print-join-command").await?;
    let worker_join = output
        .lines()
        .rev()
        .find(|line| line.contains("kubeadm join"))
        .map(str::trim)
        .ok_or_else(|| InstallError::bootstrap("kubeadm did not print a join command"))?
        .to_string();

    let master_join = if sh.spec.ha.enabled {
        let output = sh.run("kubeadm init phase upload-certs --upload-certs").await?;
        let key = extract_certificate_key(&output)?.ok_or_else(|| {
            InstallError::bootstrap("no certificate key in upload-certs output")
        })?;
        Some(format!(
            "{} --control-plane --certificate-key {}",
            worker_join, key
        ))
    } else {
        None
    };

    Ok(JoinArtifacts {
        worker_join,
        master_join,
    })
}

/// `kubeadm init` on the primary master, returning the fleet's artifacts
pub async fn bootstrap_primary(sh: &mut Shell<'_>) -> Result<JoinArtifacts> {
    sh.run(&kubeadm_init_command(sh.spec)).await?;
    install_kubeconfig(sh).await?;
    collect_join_artifacts(sh).await
}

/// Join a secondary master to an HA control plane
pub async fn join_master(sh: &mut Shell<'_>, artifacts: Option<&JoinArtifacts>) -> Result<()> {
    let command = artifacts
        .and_then(|a| a.master_join.as_deref())
        .ok_or_else(|| InstallError::bootstrap("master join command is required for HA mode"))?;
    sh.run(command).await?;
    install_kubeconfig(sh).await?;
    Ok(())
}

/// Join a worker; a worker can never bootstrap on its own
pub async fn join_worker(sh: &mut Shell<'_>, artifacts: Option<&JoinArtifacts>) -> Result<()> {
    let artifacts = artifacts.ok_or_else(|| {
        InstallError::bootstrap(
            "no worker join command available; bootstrap a master first or set join_command",
        )
    })?;
    sh.run(&artifacts.worker_join).await?;
    Ok(())
}
