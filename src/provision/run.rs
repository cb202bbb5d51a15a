// file: src/provision/run.rs
// version: 1.0.0
// guid: 5b9e3f72-8a04-4c6d-91e5-d3c27a80f416

//! One node's installation run
//!
//! A [`NodeRun`] owns the node's executor connection for its whole
//! lifetime, probes the environment once, and dispatches every planned
//! step to the installer, bootstrap, load-balancer or addon code. The
//! scheduler hands join artifacts in before execution and collects any
//! the primary master produced afterwards.

use crate::config::{ClusterSpec, NodeSpec};
use crate::error::InstallError;
use crate::installer::{probe_node, select_installer, NodeFacts, NodeInstaller, Shell};
use crate::network::{Connector, RemoteExecutor};
use crate::provision::bootstrap::{self, JoinArtifacts};
use crate::provision::pipeline::{run_pipeline, StepRunner};
use crate::provision::plan::{plan_steps, StepKind};
use crate::provision::{addons, loadbalancer, resources};
use crate::registry::{render_hosts_toml, RegistrySync};
use crate::reporter::RunLog;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const CONTAINERD_CERTS_DIR: &str = "/etc/containerd/certs.d";

/// State one fleet run shares across every node
pub struct RunContext {
    pub spec: Arc<ClusterSpec>,
    pub connector: Arc<dyn Connector>,
    /// Digest of the local offline bundle, compared against node markers
    pub bundle_digest: String,
    pub dry_run: bool,
    /// Present iff a private registry is configured; shared so the fleet
    /// syncs at most once per invocation
    pub sync: Option<Arc<tokio::sync::Mutex<RegistrySync>>>,
}

/// A connected node with its probed facts and selected installer
pub struct NodeRun {
    ctx: Arc<RunContext>,
    node: NodeSpec,
    exec: Box<dyn RemoteExecutor>,
    facts: NodeFacts,
    installer: &'static dyn NodeInstaller,
    log: RunLog,
    artifacts: Option<Arc<JoinArtifacts>>,
    produced: Option<JoinArtifacts>,
}

impl std::fmt::Debug for NodeRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRun")
            .field("node", &self.node.ip)
            .finish_non_exhaustive()
    }
}

impl NodeRun {
    /// Dial the node, probe its environment and pick its installer.
    /// Buffered transcripts are for concurrent workers; masters print
    /// directly.
    pub async fn connect(ctx: Arc<RunContext>, node: NodeSpec, buffered: bool) -> Result<Self> {
        let mut exec = ctx.connector.connect(&ctx.spec, &node).await?;
        let facts = probe_node(exec.as_mut()).await?;
        let installer = select_installer(&facts.os_name)?;
        let mut log = if buffered {
            RunLog::buffered(&node.ip)
        } else {
            RunLog::direct(&node.ip)
        };
        log.info(&format!(
            "{} {} ({}, kernel {})",
            facts.os_name, facts.os_version, facts.arch, facts.kernel
        ));
        Ok(Self {
            ctx,
            node,
            exec,
            facts,
            installer,
            log,
            artifacts: None,
            produced: None,
        })
    }

    /// Plan and drive the node's steps. Artifacts from an earlier master
    /// run come in here; in a masterless fleet they are seeded from the
    /// configured join command.
    pub async fn execute(&mut self, artifacts: Option<Arc<JoinArtifacts>>) -> Result<()> {
        self.artifacts = artifacts;
        let steps = plan_steps(&self.ctx.spec, &self.node, &self.facts);
        let dry_run = self.ctx.dry_run;
        run_pipeline(self, &steps, dry_run).await
    }

    /// Join artifacts this run produced, if it bootstrapped the cluster
    pub fn produced(&mut self) -> Option<JoinArtifacts> {
        self.produced.take()
    }

    pub fn into_log(self) -> RunLog {
        self.log
    }

    fn is_primary(&self) -> bool {
        self.ctx.spec.is_primary_execution_node(&self.node)
    }
}

async fn check_mirror(sh: &mut Shell<'_>) -> Result<bool> {
    let host = sh.spec.registry.host();
    sh.probe_contains(
        &format!("cat {}/{}/hosts.toml", CONTAINERD_CERTS_DIR, host),
        &host,
    )
    .await
}

async fn configure_mirror(sh: &mut Shell<'_>) -> Result<()> {
    let host = sh.spec.registry.host();
    let body = render_hosts_toml(&sh.spec.registry);
    sh.run(&format!("mkdir -p {}/{}", CONTAINERD_CERTS_DIR, host))
        .await?;
    sh.write_file(
        &format!("{}/{}/hosts.toml", CONTAINERD_CERTS_DIR, host),
        body.as_bytes(),
    )
    .await?;
    // containerd only consults certs.d once config_path points at it
    sh.run(&format!(
        "if [ -f /etc/containerd/config.toml ]; then \
         grep -q 'config_path = \"{dir}\"' /etc/containerd/config.toml \
         || sed -i -E 's#config_path = .*#config_path = \"{dir}\"#' /etc/containerd/config.toml; fi",
        dir = CONTAINERD_CERTS_DIR
    ))
    .await?;
    sh.run("systemctl restart containerd").await?;
    Ok(())
}

#[async_trait]
impl StepRunner for NodeRun {
    fn transcript(&mut self) -> &mut RunLog {
        &mut self.log
    }

    async fn check(&mut self, step: StepKind) -> Result<bool> {
        let installer = self.installer;
        let mut sh = Shell::new(self.exec.as_mut(), &self.facts, &self.ctx.spec);
        match step {
            StepKind::DistributeResources => {
                resources::check_resources(&mut sh, &self.ctx.bundle_digest).await
            }
            StepKind::DisableSelinux => installer.check_selinux(&mut sh).await,
            StepKind::DisableFirewall => installer.check_firewall(&mut sh).await,
            StepKind::DisableSwap => installer.check_swap(&mut sh).await,
            StepKind::LoadKernelModules => installer.check_kernel_modules(&mut sh).await,
            StepKind::ConfigureSysctl => installer.check_sysctl(&mut sh).await,
            StepKind::InstallCommonTools => installer.check_common_tools(&mut sh).await,
            StepKind::InstallDocker => installer.check_docker(&mut sh).await,
            StepKind::InstallRuntimeBinaries => installer.check_runtime_binaries(&mut sh).await,
            StepKind::ConfigureContainerdService => {
                installer.check_containerd_service(&mut sh).await
            }
            StepKind::StartContainerd => installer.check_containerd_running(&mut sh).await,
            StepKind::ConfigureCrictl => installer.check_crictl(&mut sh).await,
            StepKind::InstallNerdctl => installer.check_nerdctl(&mut sh).await,
            StepKind::InstallHelm => crate::installer::common::check_helm(&mut sh).await,
            StepKind::InstallHaproxy => installer.check_haproxy(&mut sh).await,
            StepKind::InstallKeepalived => installer.check_keepalived(&mut sh).await,
            StepKind::ConfigureLoadBalancer => {
                loadbalancer::check_load_balancer(&mut sh).await
            }
            StepKind::ConfigureRegistryMirror => check_mirror(&mut sh).await,
            StepKind::SyncRegistryImages => match &self.ctx.sync {
                Some(sync) => Ok(sync.lock().await.is_completed()),
                None => Ok(false),
            },
            StepKind::ConfigureAccelerator => installer.check_accelerator(&mut sh).await,
            StepKind::InstallK8sComponents => installer.check_k8s_components(&mut sh).await,
            StepKind::ImportOfflineImages => installer.check_images_loaded(&mut sh).await,
            StepKind::BootstrapNode => {
                let bootstrapped =
                    bootstrap::check_bootstrapped(&mut sh, self.node.is_master).await?;
                // A re-run against an initialized primary still has to hand
                // fresh join artifacts to the rest of the fleet.
                if bootstrapped && self.ctx.spec.is_primary_execution_node(&self.node) {
                    self.produced = Some(bootstrap::collect_join_artifacts(&mut sh).await?);
                }
                Ok(bootstrapped)
            }
            StepKind::InstallKubeOvn => addons::check_kube_ovn(&mut sh).await,
            StepKind::InstallMultus => addons::check_multus(&mut sh).await,
            StepKind::InstallPrometheusStack => addons::check_prometheus_stack(&mut sh).await,
            StepKind::InstallHami => addons::check_hami(&mut sh).await,
            StepKind::InstallHamiWebui => addons::check_hami_webui(&mut sh).await,
            StepKind::InstallAscendPlugin => addons::check_ascend_plugin(&mut sh).await,
        }
    }

    async fn apply(&mut self, step: StepKind) -> Result<()> {
        let installer = self.installer;
        let mut sh = Shell::new(self.exec.as_mut(), &self.facts, &self.ctx.spec);
        match step {
            StepKind::DistributeResources => {
                let bundle = Path::new(&self.ctx.spec.resource_package).to_path_buf();
                resources::distribute_resources(&mut sh, &bundle, &self.ctx.bundle_digest).await
            }
            StepKind::DisableSelinux => installer.disable_selinux(&mut sh).await,
            StepKind::DisableFirewall => installer.disable_firewall(&mut sh).await,
            StepKind::DisableSwap => installer.disable_swap(&mut sh).await,
            StepKind::LoadKernelModules => installer.load_kernel_modules(&mut sh).await,
            StepKind::ConfigureSysctl => installer.configure_sysctl(&mut sh).await,
            StepKind::InstallCommonTools => installer.install_common_tools(&mut sh).await,
            StepKind::InstallDocker => installer.install_docker(&mut sh).await,
            StepKind::InstallRuntimeBinaries => installer.install_runtime_binaries(&mut sh).await,
            StepKind::ConfigureContainerdService => {
                installer.configure_containerd_service(&mut sh).await
            }
            StepKind::StartContainerd => installer.start_containerd(&mut sh).await,
            StepKind::ConfigureCrictl => installer.configure_crictl(&mut sh).await,
            StepKind::InstallNerdctl => installer.install_nerdctl(&mut sh).await,
            StepKind::InstallHelm => crate::installer::common::install_helm(&mut sh).await,
            StepKind::InstallHaproxy => installer.install_haproxy(&mut sh).await,
            StepKind::InstallKeepalived => installer.install_keepalived(&mut sh).await,
            StepKind::ConfigureLoadBalancer => {
                loadbalancer::configure_load_balancer(&mut sh, &self.node).await
            }
            StepKind::ConfigureRegistryMirror => configure_mirror(&mut sh).await,
            StepKind::SyncRegistryImages => {
                let sync = self.ctx.sync.as_ref().ok_or_else(|| {
                    InstallError::registry("registry sync engine was never initialized")
                })?;
                let summary = sync.lock().await.run().await?;
                info!(
                    pushed = summary.pushed,
                    total = summary.total,
                    "registry sync finished"
                );
                Ok(())
            }
            StepKind::ConfigureAccelerator => installer.configure_accelerator(&mut sh).await,
            StepKind::InstallK8sComponents => installer.install_k8s_components(&mut sh).await,
            StepKind::ImportOfflineImages => installer.load_offline_images(&mut sh).await,
            StepKind::BootstrapNode => {
                if self.ctx.spec.is_primary_execution_node(&self.node) {
                    self.produced = Some(bootstrap::bootstrap_primary(&mut sh).await?);
                    Ok(())
                } else if self.node.is_master {
                    bootstrap::join_master(&mut sh, self.artifacts.as_deref()).await
                } else {
                    bootstrap::join_worker(&mut sh, self.artifacts.as_deref()).await
                }
            }
            StepKind::InstallKubeOvn => addons::install_kube_ovn(&mut sh).await,
            StepKind::InstallMultus => addons::install_multus(&mut sh).await,
            StepKind::InstallPrometheusStack => addons::install_prometheus_stack(&mut sh).await,
            StepKind::InstallHami => addons::install_hami(&mut sh).await,
            StepKind::InstallHamiWebui => addons::install_hami_webui(&mut sh).await,
            StepKind::InstallAscendPlugin => addons::install_ascend_plugin(&mut sh).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstallMode, RegistryConfig};
    use crate::provision::resources::file_sha256;
    use crate::testing::{FakeConnector, FakeShell};
    use std::io::Write;

    const OS_PROBE: &str = "Ubuntu|24.04|6.8.0|false|false";

    fn bundle() -> (tempfile::NamedTempFile, String) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"bundle bytes").unwrap();
        let digest = file_sha256(file.path()).unwrap();
        (file, digest)
    }

    fn ctx(spec: ClusterSpec, connector: FakeConnector, digest: &str, dry_run: bool) -> Arc<RunContext> {
        Arc::new(RunContext {
            spec: Arc::new(spec),
            connector: Arc::new(connector),
            bundle_digest: digest.to_string(),
            dry_run,
            sync: None,
        })
    }

    fn worker(ip: &str) -> NodeSpec {
        NodeSpec {
            ip: ip.to_string(),
            ..NodeSpec::default()
        }
    }

    #[tokio::test]
    async fn test_connect_probes_and_selects_installer() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();

        let connector = FakeConnector::new();
        connector.queue("10.0.0.2", FakeShell::new().ok("os-release", OS_PROBE));
        let ctx = ctx(spec, connector, &digest, false);
        let run = NodeRun::connect(ctx, worker("10.0.0.2"), true).await.unwrap();
        assert_eq!(run.installer.name(), "ubuntu");
        assert_eq!(run.facts.os_version, "24.04");
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_os() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();

        let connector = FakeConnector::new();
        connector.queue(
            "10.0.0.2",
            FakeShell::new().ok("os-release", "TempleOS|5.03|6.8.0|false|false"),
        );
        let ctx = ctx(spec, connector, &digest, false);
        let err = NodeRun::connect(ctx, worker("10.0.0.2"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::UnsupportedOs(_)));
    }

    #[tokio::test]
    async fn test_dry_run_only_probes() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.nodes = vec![worker("10.0.0.2")];

        let shell = FakeShell::new()
            .ok("os-release", OS_PROBE)
            .fail("cat /tmp/k8s-offline-install/.extracted_success", "missing")
            .fail("test -f /etc/kubernetes/kubelet.conf", "missing");
        let commands = shell.commands_handle();
        let uploads = shell.uploads_handle();
        let connector = FakeConnector::new();
        connector.queue("10.0.0.2", shell);

        let ctx = ctx(spec, connector, &digest, true);
        let node = worker("10.0.0.2");
        let mut run = NodeRun::connect(ctx, node, true).await.unwrap();
        run.execute(None).await.unwrap();

        assert!(uploads.lock().unwrap().is_empty());
        let commands = commands.lock().unwrap();
        assert!(!commands.iter().any(|c| c.contains("kubeadm join")));
        assert!(!commands.iter().any(|c| c.contains("swapoff")));
    }

    #[tokio::test]
    async fn test_worker_join_fails_without_artifacts() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.nodes = vec![worker("10.0.0.2")];
        // everything satisfied except the bootstrap marker
        let shell = FakeShell::new()
            .ok("os-release", OS_PROBE)
            .ok("cat /tmp/k8s-offline-install/.extracted_success", &digest)
            .fail("test -f /etc/kubernetes/kubelet.conf", "missing");
        let connector = FakeConnector::new();
        connector.queue("10.0.0.2", shell);

        let ctx = ctx(spec, connector, &digest, false);
        let mut run = NodeRun::connect(ctx, worker("10.0.0.2"), true).await.unwrap();
        let err = run.execute(None).await.unwrap_err();
        assert!(err.to_string().contains("no worker join command available"));
    }

    #[tokio::test]
    async fn test_addons_only_worker_configures_mirror_only() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.install_mode = InstallMode::AddonsOnly;
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.registry = RegistryConfig {
            endpoint: "registry.local".to_string(),
            ip: "10.0.0.50".to_string(),
            port: 8443,
            username: "admin".to_string(),
            password: "pw".to_string(),
        };
        spec.nodes = vec![worker("10.0.0.2")];

        let shell = FakeShell::new()
            .ok("os-release", OS_PROBE)
            .ok("cat /tmp/k8s-offline-install/.extracted_success", &digest)
            .fail("cat /etc/containerd/certs.d/registry.local:8443/hosts.toml", "missing");
        let uploads = shell.uploads_handle();
        let connector = FakeConnector::new();
        connector.queue("10.0.0.2", shell);

        let ctx = ctx(spec, connector, &digest, false);
        let mut run = NodeRun::connect(ctx, worker("10.0.0.2"), true).await.unwrap();
        run.execute(None).await.unwrap();

        let uploads = uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(
            uploads[0].0,
            "/etc/containerd/certs.d/registry.local:8443/hosts.toml"
        );
        let body = String::from_utf8(uploads[0].1.clone()).unwrap();
        assert!(body.contains("server = \"http://registry.local:8443\""));
    }
}
