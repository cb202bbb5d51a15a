// file: src/provision/plan.rs
// version: 1.2.0
// guid: 6c3f9a21-7e5b-4d08-a4c2-91d08e7b53f6

//! Per-node step planning
//!
//! The plan is computed up front from the cluster spec, the node's role
//! and the probed facts. Execution never adds or removes steps; a step
//! that turns out to be unnecessary is skipped by its own check.

use crate::config::{ClusterSpec, InstallMode, NodeSpec};
use crate::installer::NodeFacts;

/// Everything the pipeline knows how to do on a node, in plan order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    DistributeResources,
    DisableSelinux,
    DisableFirewall,
    DisableSwap,
    LoadKernelModules,
    ConfigureSysctl,
    InstallCommonTools,
    InstallDocker,
    InstallRuntimeBinaries,
    ConfigureContainerdService,
    StartContainerd,
    ConfigureCrictl,
    InstallNerdctl,
    InstallHelm,
    InstallHaproxy,
    InstallKeepalived,
    ConfigureLoadBalancer,
    ConfigureRegistryMirror,
    SyncRegistryImages,
    ConfigureAccelerator,
    InstallK8sComponents,
    ImportOfflineImages,
    BootstrapNode,
    InstallKubeOvn,
    InstallMultus,
    InstallPrometheusStack,
    InstallHami,
    InstallHamiWebui,
    InstallAscendPlugin,
}

impl StepKind {
    pub fn title(&self) -> &'static str {
        match self {
            StepKind::DistributeResources => "distribute offline resources",
            StepKind::DisableSelinux => "disable selinux",
            StepKind::DisableFirewall => "disable firewall",
            StepKind::DisableSwap => "disable swap",
            StepKind::LoadKernelModules => "load kernel modules",
            StepKind::ConfigureSysctl => "configure sysctl",
            StepKind::InstallCommonTools => "install common tools",
            StepKind::InstallDocker => "install docker",
            StepKind::InstallRuntimeBinaries => "install containerd and runc",
            StepKind::ConfigureContainerdService => "configure containerd service",
            StepKind::StartContainerd => "start containerd",
            StepKind::ConfigureCrictl => "install crictl",
            StepKind::InstallNerdctl => "install nerdctl",
            StepKind::InstallHelm => "install helm",
            StepKind::InstallHaproxy => "install haproxy",
            StepKind::InstallKeepalived => "install keepalived",
            StepKind::ConfigureLoadBalancer => "configure control-plane load balancer",
            StepKind::ConfigureRegistryMirror => "configure registry mirror",
            StepKind::SyncRegistryImages => "sync images to registry",
            StepKind::ConfigureAccelerator => "configure accelerator runtime",
            StepKind::InstallK8sComponents => "install kubernetes components",
            StepKind::ImportOfflineImages => "import offline images",
            StepKind::BootstrapNode => "bootstrap kubernetes",
            StepKind::InstallKubeOvn => "install kube-ovn",
            StepKind::InstallMultus => "install multus-cni",
            StepKind::InstallPrometheusStack => "install kube-prometheus-stack",
            StepKind::InstallHami => "install hami",
            StepKind::InstallHamiWebui => "install hami-webui",
            StepKind::InstallAscendPlugin => "install ascend-device-plugin",
        }
    }
}

/// Build the ordered step list for one node
pub fn plan_steps(spec: &ClusterSpec, node: &NodeSpec, facts: &NodeFacts) -> Vec<StepKind> {
    let mode = spec.install_mode;
    let primary = spec.is_primary_execution_node(node);
    let baseline = mode != InstallMode::AddonsOnly;

    let mut steps = vec![StepKind::DistributeResources];

    if baseline {
        steps.extend([
            StepKind::DisableSelinux,
            StepKind::DisableFirewall,
            StepKind::DisableSwap,
            StepKind::LoadKernelModules,
            StepKind::ConfigureSysctl,
            StepKind::InstallCommonTools,
            StepKind::InstallDocker,
            StepKind::InstallRuntimeBinaries,
            StepKind::ConfigureContainerdService,
            StepKind::StartContainerd,
            StepKind::ConfigureCrictl,
            StepKind::InstallNerdctl,
        ]);
    }

    if primary {
        steps.push(StepKind::InstallHelm);
    }

    if spec.ha.enabled && node.is_master {
        steps.extend([
            StepKind::InstallHaproxy,
            StepKind::InstallKeepalived,
            StepKind::ConfigureLoadBalancer,
        ]);
    }

    if spec.registry.enabled() {
        steps.push(StepKind::ConfigureRegistryMirror);
        if primary {
            steps.push(StepKind::SyncRegistryImages);
        }
    }

    if facts.has_gpu || facts.has_npu {
        steps.push(StepKind::ConfigureAccelerator);
    }

    if baseline {
        steps.push(StepKind::InstallK8sComponents);
        if !spec.registry.enabled() {
            steps.push(StepKind::ImportOfflineImages);
        }
    }

    if mode == InstallMode::Full {
        steps.push(StepKind::BootstrapNode);
    }

    if primary && mode != InstallMode::InstallOnly {
        let addons = &spec.addons;
        if addons.kube_ovn.enabled {
            steps.push(StepKind::InstallKubeOvn);
        }
        if addons.multus_cni.enabled {
            steps.push(StepKind::InstallMultus);
        }
        if mode == InstallMode::AddonsOnly {
            if addons.kube_prometheus_stack.enabled {
                steps.push(StepKind::InstallPrometheusStack);
            }
            if addons.hami.enabled {
                steps.push(StepKind::InstallHami);
            }
            if addons.hami_webui.enabled {
                steps.push(StepKind::InstallHamiWebui);
            }
            if addons.ascend_device_plugin.enabled {
                steps.push(StepKind::InstallAscendPlugin);
            }
        }
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Architecture;

    fn facts() -> NodeFacts {
        NodeFacts {
            arch: Architecture::Amd64,
            os_name: "Ubuntu".to_string(),
            os_version: "24.04".to_string(),
            kernel: "6.8.0".to_string(),
            has_gpu: false,
            has_npu: false,
        }
    }

    fn node(ip: &str, master: bool) -> NodeSpec {
        NodeSpec {
            ip: ip.to_string(),
            is_master: master,
            ..NodeSpec::default()
        }
    }

    fn spec() -> ClusterSpec {
        ClusterSpec {
            nodes: vec![node("10.0.0.1", true), node("10.0.0.2", false)],
            ..ClusterSpec::default()
        }
    }

    #[test]
    fn test_full_mode_worker_plan() {
        let spec = spec();
        let steps = plan_steps(&spec, &spec.nodes[1], &facts());
        assert_eq!(steps[0], StepKind::DistributeResources);
        assert!(steps.contains(&StepKind::DisableSwap));
        assert!(steps.contains(&StepKind::InstallK8sComponents));
        assert!(steps.contains(&StepKind::ImportOfflineImages));
        assert!(steps.contains(&StepKind::BootstrapNode));
        assert!(!steps.contains(&StepKind::InstallHelm));
        assert!(!steps.contains(&StepKind::InstallHaproxy));
        assert!(!steps.contains(&StepKind::InstallKubeOvn));
    }

    #[test]
    fn test_full_mode_master_gets_helm_and_addons() {
        let mut spec = spec();
        spec.addons.kube_ovn.enabled = true;
        spec.addons.kube_prometheus_stack.enabled = true;
        let steps = plan_steps(&spec, &spec.nodes[0], &facts());
        assert!(steps.contains(&StepKind::InstallHelm));
        assert!(steps.contains(&StepKind::InstallKubeOvn));
        // Monitoring addons only deploy in addons-only mode
        assert!(!steps.contains(&StepKind::InstallPrometheusStack));
    }

    #[test]
    fn test_addons_only_mode_skips_baseline() {
        let mut spec = spec();
        spec.install_mode = InstallMode::AddonsOnly;
        spec.addons.kube_prometheus_stack.enabled = true;
        spec.addons.hami.enabled = true;
        let steps = plan_steps(&spec, &spec.nodes[0], &facts());
        assert_eq!(steps[0], StepKind::DistributeResources);
        assert!(!steps.contains(&StepKind::DisableSwap));
        assert!(!steps.contains(&StepKind::InstallDocker));
        assert!(!steps.contains(&StepKind::InstallK8sComponents));
        assert!(!steps.contains(&StepKind::BootstrapNode));
        assert!(steps.contains(&StepKind::InstallHelm));
        assert!(steps.contains(&StepKind::InstallPrometheusStack));
        assert!(steps.contains(&StepKind::InstallHami));
    }

    #[test]
    fn test_install_only_mode_stops_before_bootstrap() {
        let mut spec = spec();
        spec.install_mode = InstallMode::InstallOnly;
        spec.addons.kube_ovn.enabled = true;
        let steps = plan_steps(&spec, &spec.nodes[0], &facts());
        assert!(steps.contains(&StepKind::InstallK8sComponents));
        assert!(!steps.contains(&StepKind::BootstrapNode));
        assert!(!steps.contains(&StepKind::InstallKubeOvn));
    }

    #[test]
    fn test_ha_masters_get_load_balancer_steps() {
        let mut spec = spec();
        spec.ha.enabled = true;
        spec.ha.virtual_ip = "10.0.0.100".to_string();
        spec.nodes[0].is_primary_master = true;
        let master_steps = plan_steps(&spec, &spec.nodes[0], &facts());
        assert!(master_steps.contains(&StepKind::InstallHaproxy));
        assert!(master_steps.contains(&StepKind::InstallKeepalived));
        assert!(master_steps.contains(&StepKind::ConfigureLoadBalancer));

        let worker_steps = plan_steps(&spec, &spec.nodes[1], &facts());
        assert!(!worker_steps.contains(&StepKind::InstallHaproxy));
    }

    #[test]
    fn test_registry_replaces_image_import_and_gates_sync() {
        let mut spec = spec();
        spec.registry.endpoint = "registry.local".to_string();
        spec.registry.port = 8443;

        let master_steps = plan_steps(&spec, &spec.nodes[0], &facts());
        assert!(master_steps.contains(&StepKind::ConfigureRegistryMirror));
        assert!(master_steps.contains(&StepKind::SyncRegistryImages));
        assert!(!master_steps.contains(&StepKind::ImportOfflineImages));

        let worker_steps = plan_steps(&spec, &spec.nodes[1], &facts());
        assert!(worker_steps.contains(&StepKind::ConfigureRegistryMirror));
        assert!(!worker_steps.contains(&StepKind::SyncRegistryImages));
    }

    #[test]
    fn test_accelerator_step_follows_probed_hardware() {
        let spec = spec();
        let mut gpu_facts = facts();
        gpu_facts.has_gpu = true;
        assert!(plan_steps(&spec, &spec.nodes[1], &gpu_facts)
            .contains(&StepKind::ConfigureAccelerator));
        assert!(!plan_steps(&spec, &spec.nodes[1], &facts())
            .contains(&StepKind::ConfigureAccelerator));
    }

    #[test]
    fn test_sync_precedes_component_install() {
        let mut spec = spec();
        spec.registry.endpoint = "registry.local".to_string();
        spec.registry.port = 8443;
        let steps = plan_steps(&spec, &spec.nodes[0], &facts());
        let sync = steps
            .iter()
            .position(|s| *s == StepKind::SyncRegistryImages)
            .unwrap();
        let components = steps
            .iter()
            .position(|s| *s == StepKind::InstallK8sComponents)
            .unwrap();
        let bootstrap = steps
            .iter()
            .position(|s| *s == StepKind::BootstrapNode)
            .unwrap();
        assert!(sync < components);
        assert!(components < bootstrap);
    }
}
