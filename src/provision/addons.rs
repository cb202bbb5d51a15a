// file: src/provision/addons.rs
// version: 1.0.0
// guid: 92e56b0a-4d18-47cf-a3e9-5b80c217d64f

//! Addon deployment from the primary execution node
//!
//! Charts and manifests ship inside the offline bundle, so every deploy
//! references the staging directory. Helm releases are checked by name
//! before installing; manifest addons by the daemonset they create.

use crate::installer::Shell;
use crate::Result;

/// A chart-based addon staged in the bundle
struct HelmAddon {
    release: &'static str,
    namespace: &'static str,
    chart: &'static str,
}

const KUBE_OVN: HelmAddon = HelmAddon {
    release: "kube-ovn",
    namespace: "kube-system",
    chart: "kube-ovn",
};

const PROMETHEUS_STACK: HelmAddon = HelmAddon {
    release: "kube-prometheus-stack",
    namespace: "monitoring",
    chart: "kube-prometheus-stack",
};

const HAMI: HelmAddon = HelmAddon {
    release: "hami",
    namespace: "kube-system",
    chart: "hami",
};

const HAMI_WEBUI: HelmAddon = HelmAddon {
    release: "hami-webui",
    namespace: "kube-system",
    chart: "hami-webui",
};

async fn release_installed(sh: &mut Shell<'_>, addon: &HelmAddon) -> Result<bool> {
    sh.probe_ok(&format!(
        "helm status {} -n {}",
        addon.release, addon.namespace
    ))
    .await
}

async fn helm_install(sh: &mut Shell<'_>, addon: &HelmAddon, sets: &[String]) -> Result<()> {
    let mut cmd = format!(
        "helm upgrade --install {} {}/addons/{} -n {} --create-namespace",
        addon.release,
        sh.staging(),
        addon.chart,
        addon.namespace
    );
    for set in sets {
        cmd.push_str(" --set ");
        cmd.push_str(set);
    }
    sh.run(&cmd).await?;
    Ok(())
}

/// Registry override every chart understands when the mirror is active
fn registry_sets(sh: &Shell<'_>) -> Vec<String> {
    if sh.spec.registry.enabled() {
        vec![format!("global.imageRegistry={}", sh.spec.registry.host())]
    } else {
        Vec::new()
    }
}

pub async fn check_kube_ovn(sh: &mut Shell<'_>) -> Result<bool> {
    release_installed(sh, &KUBE_OVN).await
}

/// kube-ovn pins its OVN databases to the master set
pub async fn install_kube_ovn(sh: &mut Shell<'_>) -> Result<()> {
    let mut sets = registry_sets(sh);
    sets.push(format!(
        "MASTER_NODES={}",
        sh.spec.master_ips().join("\\,")
    ));
    helm_install(sh, &KUBE_OVN, &sets).await
}

pub async fn check_multus(sh: &mut Shell<'_>) -> Result<bool> {
    sh.probe_ok("kubectl get daemonset kube-multus-ds -n kube-system")
        .await
}

pub async fn install_multus(sh: &mut Shell<'_>) -> Result<()> {
    sh.run(&format!(
        "kubectl apply -f {}/addons/multus-daemonset.yaml",
        sh.staging()
    ))
    .await?;
    Ok(())
}

pub async fn check_prometheus_stack(sh: &mut Shell<'_>) -> Result<bool> {
    release_installed(sh, &PROMETHEUS_STACK).await
}

pub async fn install_prometheus_stack(sh: &mut Shell<'_>) -> Result<()> {
    let sets = registry_sets(sh);
    helm_install(sh, &PROMETHEUS_STACK, &sets).await
}

pub async fn check_hami(sh: &mut Shell<'_>) -> Result<bool> {
    release_installed(sh, &HAMI).await
}

/// HAMi's scheduler extender must match the apiserver's scheduler tag
pub async fn install_hami(sh: &mut Shell<'_>) -> Result<()> {
    let mut sets = registry_sets(sh);
    sets.push(format!(
        "scheduler.kubeScheduler.imageTag=v{}",
        sh.versions().kubernetes
    ));
    helm_install(sh, &HAMI, &sets).await
}

pub async fn check_hami_webui(sh: &mut Shell<'_>) -> Result<bool> {
    release_installed(sh, &HAMI_WEBUI).await
}

pub async fn install_hami_webui(sh: &mut Shell<'_>) -> Result<()> {
    let sets = registry_sets(sh);
    helm_install(sh, &HAMI_WEBUI, &sets).await
}

pub async fn check_ascend_plugin(sh: &mut Shell<'_>) -> Result<bool> {
    sh.probe_ok("kubectl get daemonset ascend-device-plugin-daemonset -n kube-system")
        .await
}

pub async fn install_ascend_plugin(sh: &mut Shell<'_>) -> Result<()> {
    sh.run(&format!(
        "kubectl apply -f {}/addons/ascend-device-plugin.yaml",
        sh.staging()
    ))
    .await?;
    Ok(())
}
