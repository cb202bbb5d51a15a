// file: src/provision/scheduler.rs
// version: 1.0.0
// guid: 1f4c82d9-6e05-4b37-a9f1-803d5c24e67b

//! Fleet scheduling
//!
//! Masters run strictly before workers because workers consume the join
//! artifacts a master produces; in HA mode the primary master runs before
//! the other masters for the same reason. The master phase is sequential
//! on the caller's task. Workers run concurrently, one task per node,
//! and their results are re-sorted into configured node order so reports
//! are stable regardless of completion order.

use crate::config::ClusterSpec;
use crate::error::InstallError;
use crate::network::Connector;
use crate::provision::bootstrap::JoinArtifacts;
use crate::provision::resources::file_sha256;
use crate::provision::run::{NodeRun, RunContext};
use crate::registry::RegistrySync;
use crate::reporter::{NodeOutcome, NodeReport, RunLog};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Every node's result plus the transcripts, in configured node order
pub struct FleetReport {
    pub reports: Vec<NodeReport>,
    pub transcripts: Vec<RunLog>,
}

impl FleetReport {
    pub fn all_completed(&self) -> bool {
        self.reports
            .iter()
            .all(|r| r.outcome == NodeOutcome::Completed)
    }
}

/// Provision the whole fleet described by `spec`
pub async fn run_fleet(
    spec: Arc<ClusterSpec>,
    connector: Arc<dyn Connector>,
    dry_run: bool,
) -> Result<FleetReport> {
    let bundle_digest = file_sha256(Path::new(&spec.resource_package))?;
    let sync = if spec.registry.enabled() {
        Some(Arc::new(tokio::sync::Mutex::new(RegistrySync::new(
            Arc::clone(&spec),
        )?)))
    } else {
        None
    };
    let ctx = Arc::new(RunContext {
        spec,
        connector,
        bundle_digest,
        dry_run,
        sync,
    });
    run_fleet_with(ctx).await
}

/// Master indices in execution order: the primary first when HA is on,
/// configured order otherwise
fn master_order(spec: &ClusterSpec) -> Vec<usize> {
    let mut order: Vec<usize> = spec
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_master)
        .map(|(i, _)| i)
        .collect();
    if spec.ha.enabled {
        order.sort_by_key(|&i| (!spec.nodes[i].is_primary_master, i));
    }
    order
}

pub(crate) async fn run_fleet_with(ctx: Arc<RunContext>) -> Result<FleetReport> {
    let spec = Arc::clone(&ctx.spec);
    let total = spec.nodes.len();
    let mut outcomes: Vec<Option<NodeOutcome>> = vec![None; total];
    let mut transcripts: Vec<RunLog> = Vec::new();

    let mut artifacts: Option<Arc<JoinArtifacts>> =
        JoinArtifacts::from_config(&spec).map(Arc::new);

    // Master phase: sequential, fail-stop. Everything the primary master
    // produced is visible to later runs before they start.
    let mut master_failed = false;
    for index in master_order(&spec) {
        let node = spec.nodes[index].clone();
        let ip = node.ip.clone();
        info!(ip = %ip, "starting master run");
        match NodeRun::connect(Arc::clone(&ctx), node, false).await {
            Ok(mut run) => {
                let result = run.execute(artifacts.clone()).await;
                if let Some(produced) = run.produced() {
                    artifacts = Some(Arc::new(produced));
                }
                transcripts.push(run.into_log());
                match result {
                    Ok(()) => outcomes[index] = Some(NodeOutcome::Completed),
                    Err(e) => {
                        let err = InstallError::on_node(&ip, e);
                        warn!("{}", err);
                        outcomes[index] = Some(NodeOutcome::Failed(err.to_string()));
                        master_failed = true;
                    }
                }
            }
            Err(e) => {
                let err = InstallError::on_node(&ip, e);
                warn!("{}", err);
                outcomes[index] = Some(NodeOutcome::Failed(err.to_string()));
                master_failed = true;
            }
        }
        if master_failed {
            break;
        }
    }

    if master_failed {
        // Nothing that has not started may start now; mark it all skipped
        // so the summary still has a row for every node.
        for outcome in outcomes.iter_mut() {
            if outcome.is_none() {
                *outcome = Some(NodeOutcome::Skipped);
            }
        }
        return Ok(finish(&spec, outcomes, transcripts));
    }

    // Worker phase: one task per node, each owning its own connection.
    // Sibling failures are independent; nothing is cancelled.
    let mut tasks: JoinSet<(usize, NodeOutcome, Option<RunLog>)> = JoinSet::new();
    for (index, node) in spec.nodes.iter().enumerate() {
        if node.is_master {
            continue;
        }
        let ctx = Arc::clone(&ctx);
        let node = node.clone();
        let artifacts = artifacts.clone();
        tasks.spawn(async move {
            let ip = node.ip.clone();
            match NodeRun::connect(ctx, node, true).await {
                Ok(mut run) => {
                    let outcome = match run.execute(artifacts).await {
                        Ok(()) => NodeOutcome::Completed,
                        Err(e) => {
                            NodeOutcome::Failed(InstallError::on_node(&ip, e).to_string())
                        }
                    };
                    (index, outcome, Some(run.into_log()))
                }
                Err(e) => {
                    let err = InstallError::on_node(&ip, e);
                    (index, NodeOutcome::Failed(err.to_string()), None)
                }
            }
        });
    }

    let mut worker_logs: Vec<(usize, RunLog)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome, log) = joined
            .map_err(|e| InstallError::config(format!("worker task panicked: {}", e)))?;
        if let NodeOutcome::Failed(reason) = &outcome {
            warn!("{}", reason);
        }
        outcomes[index] = Some(outcome);
        if let Some(log) = log {
            worker_logs.push((index, log));
        }
    }

    // Completion order is nondeterministic; flush transcripts by node index
    worker_logs.sort_by_key(|(index, _)| *index);
    for (_, log) in worker_logs {
        log.flush();
        transcripts.push(log);
    }

    Ok(finish(&spec, outcomes, transcripts))
}

fn finish(
    spec: &ClusterSpec,
    outcomes: Vec<Option<NodeOutcome>>,
    transcripts: Vec<RunLog>,
) -> FleetReport {
    let reports = spec
        .nodes
        .iter()
        .zip(outcomes)
        .map(|(node, outcome)| NodeReport {
            ip: node.ip.clone(),
            is_master: node.is_master,
            outcome: outcome.unwrap_or(NodeOutcome::Skipped),
        })
        .collect();
    FleetReport {
        reports,
        transcripts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeSpec;
    use crate::testing::{FakeConnector, FakeShell};
    use std::io::Write;

    const OS_PROBE: &str = "Ubuntu|24.04|6.8.0|false|false";
    const JOIN_LINE: &str = "kubeadm join 10.0.0.100:16443 --token abcdef.0123456789abcdef \
        --discovery-token-ca-cert-hash sha256:2222222222222222222222222222222222222222222222222222222222222222";
    const CERT_KEY: &str = "aabb0011223344556677889900aabbccddeeff00112233445566778899aabbcc";

    fn bundle() -> (tempfile::NamedTempFile, String) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"offline bundle").unwrap();
        let digest = file_sha256(file.path()).unwrap();
        (file, digest)
    }

    fn node(ip: &str, master: bool, primary: bool) -> NodeSpec {
        NodeSpec {
            ip: ip.to_string(),
            interface: Some("eth0".to_string()),
            is_master: master,
            is_primary_master: primary,
            ..NodeSpec::default()
        }
    }

    /// Shell whose node is fully provisioned except for cluster membership
    fn fresh_shell(digest: &str, master: bool) -> FakeShell {
        let marker = if master {
            "test -f /etc/kubernetes/admin.conf"
        } else {
            "test -f /etc/kubernetes/kubelet.conf"
        };
        FakeShell::new()
            .ok("os-release", OS_PROBE)
            .ok("cat /tmp/k8s-offline-install/.extracted_success", digest)
            .ok("systemctl is-active", "active")
            .fail(marker, "missing")
    }

    fn ctx(spec: ClusterSpec, connector: FakeConnector, digest: &str) -> Arc<RunContext> {
        Arc::new(RunContext {
            spec: Arc::new(spec),
            connector: Arc::new(connector),
            bundle_digest: digest.to_string(),
            dry_run: false,
            sync: None,
        })
    }

    #[tokio::test]
    async fn test_ha_scenario_one_init_shared_join() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.ha.enabled = true;
        spec.ha.virtual_ip = "10.0.0.100/24".to_string();
        spec.nodes = vec![
            node("10.0.0.2", true, false),
            node("10.0.0.1", true, true),
            node("10.0.0.3", false, false),
            node("10.0.0.4", false, false),
        ];

        let primary = fresh_shell(&digest, true)
            .ok("kubeadm token create --print-join-command", JOIN_LINE)
            .ok(
                "kubeadm init phase upload-certs --upload-certs",
                &format!("[upload-certs] Using certificate key:\n{}", CERT_KEY),
            )
            // LB not yet configured on a fresh master
            .fail("grep -q", "missing");
        let secondary = fresh_shell(&digest, true).fail("grep -q", "missing");
        let worker_a = fresh_shell(&digest, false);
        let worker_b = fresh_shell(&digest, false);

        let connector = FakeConnector::new();
        let dialed = connector.dialed_handle();
        connector.queue("10.0.0.1", primary.clone());
        connector.queue("10.0.0.2", secondary.clone());
        connector.queue("10.0.0.3", worker_a.clone());
        connector.queue("10.0.0.4", worker_b.clone());

        let fleet = run_fleet_with(ctx(spec, connector, &digest)).await.unwrap();
        assert!(fleet.all_completed(), "reports: {:?}", fleet.reports);

        // The primary master runs first despite being listed second
        let dialed = dialed.lock().unwrap();
        assert_eq!(dialed[0], "10.0.0.1");
        assert_eq!(dialed[1], "10.0.0.2");

        // Exactly one init, exactly one upload-certs, both on the primary
        assert_eq!(primary.ran_count("kubeadm init --v 0"), 1);
        assert_eq!(primary.ran_count("kubeadm init phase upload-certs"), 1);
        assert!(primary.ran("--control-plane-endpoint \"10.0.0.100:16443\""));
        assert!(!secondary.ran("kubeadm init --v 0"));

        // The secondary joins as control plane with the extracted key
        let expected_master_join =
            format!("{} --control-plane --certificate-key {}", JOIN_LINE, CERT_KEY);
        assert!(secondary.ran(&expected_master_join));

        // Both workers run the identical worker join command
        for worker in [&worker_a, &worker_b] {
            assert_eq!(worker.ran_count(JOIN_LINE), 1);
            assert!(!worker.ran("--control-plane"));
        }

        // Each master rendered its own keepalived config; the secondary's
        // is BACKUP at lower priority
        let secondary_uploads = secondary.uploads.lock().unwrap();
        let keepalived = secondary_uploads
            .iter()
            .find(|(path, _)| path.ends_with("keepalived.conf"))
            .map(|(_, data)| String::from_utf8(data.clone()).unwrap())
            .unwrap();
        assert!(keepalived.contains("state BACKUP"));
        assert!(keepalived.contains("priority 90"));
        let primary_uploads = primary.uploads.lock().unwrap();
        let keepalived = primary_uploads
            .iter()
            .find(|(path, _)| path.ends_with("keepalived.conf"))
            .map(|(_, data)| String::from_utf8(data.clone()).unwrap())
            .unwrap();
        assert!(keepalived.contains("state MASTER"));
        assert!(keepalived.contains("priority 100"));
    }

    #[tokio::test]
    async fn test_master_failure_skips_workers_without_dialing() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.nodes = vec![
            node("10.0.0.1", true, false),
            node("10.0.0.3", false, false),
            node("10.0.0.4", false, false),
        ];

        let master = fresh_shell(&digest, true).fail("kubeadm init", "exit status 1");
        let connector = FakeConnector::new();
        let dialed = connector.dialed_handle();
        connector.queue("10.0.0.1", master);
        // nothing queued for the workers: dialing them would fail the test

        let fleet = run_fleet_with(ctx(spec, connector, &digest)).await.unwrap();

        assert_eq!(fleet.reports.len(), 3);
        assert!(matches!(fleet.reports[0].outcome, NodeOutcome::Failed(_)));
        assert_eq!(fleet.reports[1].outcome, NodeOutcome::Skipped);
        assert_eq!(fleet.reports[2].outcome, NodeOutcome::Skipped);
        assert_eq!(*dialed.lock().unwrap(), vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_worker_does_not_cancel_siblings() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.nodes = vec![
            node("10.0.0.1", true, false),
            node("10.0.0.3", false, false),
            node("10.0.0.4", false, false),
        ];

        let master = fresh_shell(&digest, true)
            .ok("kubeadm token create --print-join-command", JOIN_LINE);
        let broken = fresh_shell(&digest, false).fail("kubeadm join", "connection refused");
        let healthy = fresh_shell(&digest, false);
        let healthy_handle = healthy.clone();

        let connector = FakeConnector::new();
        connector.queue("10.0.0.1", master);
        connector.queue("10.0.0.3", broken);
        connector.queue("10.0.0.4", healthy);

        let fleet = run_fleet_with(ctx(spec, connector, &digest)).await.unwrap();

        assert_eq!(fleet.reports[0].outcome, NodeOutcome::Completed);
        match &fleet.reports[1].outcome {
            NodeOutcome::Failed(reason) => {
                assert!(reason.contains("10.0.0.3"));
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(fleet.reports[2].outcome, NodeOutcome::Completed);
        assert!(healthy_handle.ran(JOIN_LINE));
    }

    #[tokio::test]
    async fn test_masterless_fleet_uses_configured_join_command() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.join_command = Some(JOIN_LINE.to_string());
        spec.nodes = vec![node("10.0.0.3", false, false)];

        let worker = fresh_shell(&digest, false);
        let handle = worker.clone();
        let connector = FakeConnector::new();
        connector.queue("10.0.0.3", worker);

        let fleet = run_fleet_with(ctx(spec, connector, &digest)).await.unwrap();
        assert!(fleet.all_completed());
        assert!(handle.ran(JOIN_LINE));
    }

    #[tokio::test]
    async fn test_rerun_against_joined_fleet_applies_nothing() {
        let (bundle, digest) = bundle();
        let mut spec = ClusterSpec::default();
        spec.resource_package = bundle.path().to_string_lossy().to_string();
        spec.versions.kubernetes = "1.35.0".to_string();
        spec.nodes = vec![node("10.0.0.1", true, false), node("10.0.0.3", false, false)];

        // Fully provisioned nodes: bootstrap markers exist, versions match,
        // every tunable already holds and all offline images are imported
        let image_listing = crate::config::images::required_images(&spec).unwrap().join("\n");
        let provisioned = |master: bool| {
            let mut shell = FakeShell::new()
                .ok("os-release", OS_PROBE)
                .ok("cat /tmp/k8s-offline-install/.extracted_success", &digest)
                .ok("systemctl is-active", "active")
                .ok("systemctl is-active firewalld", "inactive")
                .ok("sysctl -n", "1\n1\n1")
                .ok("ctr -n k8s.io images ls -q", &image_listing)
                .ok("kubeadm version -o short", "v1.35.0")
                .ok("kubelet --version", "Kubernetes v1.35.0")
                .ok("kubeadm token create --print-join-command", JOIN_LINE);
            let marker = if master {
                "test -f /etc/kubernetes/admin.conf"
            } else {
                "test -f /etc/kubernetes/kubelet.conf"
            };
            if master {
                shell = shell.ok("helm version --short", "v3.16.2+g13654ca");
            }
            shell = shell.ok(marker, "");
            shell
        };

        let master = provisioned(true);
        let worker = provisioned(false);
        let master_handle = master.clone();
        let worker_handle = worker.clone();
        let connector = FakeConnector::new();
        connector.queue("10.0.0.1", master);
        connector.queue("10.0.0.3", worker);

        let fleet = run_fleet_with(ctx(spec, connector, &digest)).await.unwrap();
        assert!(fleet.all_completed());

        // The joined master still refreshes join artifacts for the fleet,
        // but no node re-initializes or re-joins.
        assert!(master_handle.ran("kubeadm token create"));
        assert!(!master_handle.ran("kubeadm init --v 0"));
        assert!(!master_handle.ran("tar -xzf"));
        assert!(!worker_handle.ran("kubeadm join"));
        assert!(!worker_handle.ran("tar -xzf"));
        assert!(worker_handle.uploads.lock().unwrap().is_empty());
    }
}
