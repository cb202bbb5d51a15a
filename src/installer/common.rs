// file: src/installer/common.rs
// version: 1.2.0
// guid: 4b7aa2c6-0df3-45b8-9c11-62f4d8e97a15

//! Recipes shared by every OS family
//!
//! Each pair of functions implements one check/apply contract from the
//! node pipeline. Checks probe, applies mutate; none of them decide
//! ordering, that belongs to the step plan.

use crate::config::{ClusterSpec, HELM_VERSION, PAUSE_IMAGE};
use crate::installer::Shell;
use crate::Result;
use std::collections::HashSet;

const MODULES_CONF_PATH: &str = "/etc/modules-load.d/k8s.conf";
const SYSCTL_CONF_PATH: &str = "/etc/sysctl.d/99-kubernetes-cri.conf";
const CRICTL_CONF_PATH: &str = "/etc/crictl.yaml";
const CONTAINERD_CONFIG_PATH: &str = "/etc/containerd/config.toml";
const CONTAINERD_UNIT_PATH: &str = "/etc/systemd/system/containerd.service";
const DOCKER_UNIT_PATH: &str = "/etc/systemd/system/docker.service";
const DOCKER_DAEMON_PATH: &str = "/etc/docker/daemon.json";

const KERNEL_MODULES: [&str; 2] = ["overlay", "br_netfilter"];
const SYSCTL_KEYS: [&str; 3] = [
    "net.bridge.bridge-nf-call-iptables",
    "net.bridge.bridge-nf-call-ip6tables",
    "net.ipv4.ip_forward",
];
const COMMON_TOOLS: [&str; 4] = ["socat", "conntrack", "ipset", "ebtables"];

const CONTAINERD_UNIT: &str = "\
[Unit]
Description=containerd container runtime
Documentation=https://containerd.io
After=network.target local-fs.target

[Service]
ExecStartPre=-/sbin/modprobe overlay
ExecStart=/usr/local/bin/containerd
Type=notify
Delegate=yes
KillMode=process
Restart=always
RestartSec=5
LimitNPROC=infinity
LimitCORE=infinity
LimitNOFILE=infinity
TasksMax=infinity
OOMScoreAdjust=-999

[Install]
WantedBy=multi-user.target
";

const DOCKER_UNIT: &str = "\
[Unit]
Description=Docker Application Container Engine
Documentation=https://docs.docker.com
After=network-online.target containerd.service
Wants=network-online.target

[Service]
Type=notify
ExecStart=/usr/bin/dockerd
ExecReload=/bin/kill -s HUP $MAINPID
TimeoutStartSec=0
Restart=always
RestartSec=5
LimitNPROC=infinity
LimitCORE=infinity

[Install]
WantedBy=multi-user.target
";

const CRICTL_CONFIG: &str = "\
runtime-endpoint: unix:///run/containerd/containerd.sock
image-endpoint: unix:///run/containerd/containerd.sock
timeout: 10
";

/// Pause image kubelet and containerd must agree on
pub fn sandbox_image(spec: &ClusterSpec) -> String {
    format!("{}/{}", spec.image_repository(), PAUSE_IMAGE)
}

pub async fn check_selinux_disabled(sh: &mut Shell<'_>) -> Result<bool> {
    match sh.probe("getenforce").await? {
        Some(state) => Ok(!state.eq_ignore_ascii_case("enforcing")),
        None => Ok(true),
    }
}

pub async fn disable_selinux(sh: &mut Shell<'_>) -> Result<()> {
    sh.run("setenforce 0").await?;
    sh.run("sed -i 's/^SELINUX=enforcing/SELINUX=disabled/' /etc/selinux/config")
        .await?;
    Ok(())
}

pub async fn check_firewalld_inactive(sh: &mut Shell<'_>) -> Result<bool> {
    match sh.probe("systemctl is-active firewalld").await? {
        Some(state) => Ok(state != "active"),
        None => Ok(true),
    }
}

pub async fn disable_firewalld(sh: &mut Shell<'_>) -> Result<()> {
    sh.run("systemctl disable --now firewalld").await?;
    Ok(())
}

pub async fn check_swap_off(sh: &mut Shell<'_>) -> Result<bool> {
    match sh.probe("swapon --summary").await? {
        Some(out) => Ok(out.is_empty()),
        None => Ok(true),
    }
}

pub async fn disable_swap(sh: &mut Shell<'_>) -> Result<()> {
    sh.run("swapoff -a").await?;
    sh.run(r"sed -i '/\sswap\s/s/^\([^#]\)/#\1/' /etc/fstab").await?;
    Ok(())
}

pub async fn check_kernel_modules(sh: &mut Shell<'_>) -> Result<bool> {
    for module in KERNEL_MODULES {
        if !sh
            .probe_ok(&format!("lsmod | grep -q '^{} '", module))
            .await?
        {
            return Ok(false);
        }
    }
    Ok(true)
}

pub async fn load_kernel_modules(sh: &mut Shell<'_>) -> Result<()> {
    let conf = KERNEL_MODULES.join("\n") + "\n";
    sh.write_file(MODULES_CONF_PATH, conf.as_bytes()).await?;
    for module in KERNEL_MODULES {
        sh.run(&format!("modprobe {}", module)).await?;
    }
    Ok(())
}

pub async fn check_sysctl(sh: &mut Shell<'_>) -> Result<bool> {
    let cmd = format!("sysctl -n {}", SYSCTL_KEYS.join(" "));
    match sh.probe(&cmd).await? {
        Some(out) => {
            let values: Vec<&str> = out.lines().map(str::trim).collect();
            Ok(values.len() == SYSCTL_KEYS.len() && values.iter().all(|v| *v == "1"))
        }
        None => Ok(false),
    }
}

pub async fn configure_sysctl(sh: &mut Shell<'_>) -> Result<()> {
    let mut conf = String::new();
    for key in SYSCTL_KEYS {
        conf.push_str(key);
        conf.push_str(" = 1\n");
    }
    sh.write_file(SYSCTL_CONF_PATH, conf.as_bytes()).await?;
    sh.run("sysctl --system").await?;
    Ok(())
}

pub async fn check_common_tools(sh: &mut Shell<'_>) -> Result<bool> {
    for tool in COMMON_TOOLS {
        if !sh.probe_ok(&format!("command -v {}", tool)).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub async fn check_docker(sh: &mut Shell<'_>) -> Result<bool> {
    let version = sh.versions().docker_ce.clone();
    if !sh.probe_contains("docker --version", &version).await? {
        return Ok(false);
    }
    match sh.probe("systemctl is-active docker").await? {
        Some(state) => Ok(state == "active"),
        None => Ok(false),
    }
}

pub async fn install_docker(sh: &mut Shell<'_>) -> Result<()> {
    let version = sh.versions().docker_ce.clone();
    let dir = sh.versioned_dir("docker", &version);
    sh.run(&format!("tar -xzf {}/docker-{}.tgz -C {}", dir, version, dir))
        .await?;
    sh.run(&format!("cp -f {}/docker/* /usr/bin/", dir)).await?;
    if sh.spec.registry.enabled() {
        let daemon = serde_json::json!({
            "insecure-registries": [sh.spec.registry.host()],
        });
        let body = serde_json::to_string_pretty(&daemon)?;
        sh.run("mkdir -p /etc/docker").await?;
        sh.write_file(DOCKER_DAEMON_PATH, body.as_bytes()).await?;
    }
    sh.write_file(DOCKER_UNIT_PATH, DOCKER_UNIT.as_bytes()).await?;
    sh.run("systemctl daemon-reload && systemctl enable --now docker")
        .await?;
    Ok(())
}

pub async fn check_runtime_binaries(sh: &mut Shell<'_>) -> Result<bool> {
    let containerd = sh.versions().containerd.clone();
    let runc = sh.versions().runc.clone();
    Ok(sh.probe_contains("containerd --version", &containerd).await?
        && sh.probe_contains("runc --version", &runc).await?)
}

pub async fn install_runtime_binaries(sh: &mut Shell<'_>) -> Result<()> {
    let containerd = sh.versions().containerd.clone();
    let runc = sh.versions().runc.clone();
    let arch = sh.arch().as_str();
    let dir = sh.versioned_dir("containerd", &containerd);
    sh.run(&format!(
        "tar -xzf {}/containerd-{}-linux-{}.tar.gz -C /usr/local",
        dir, containerd, arch
    ))
    .await?;
    let dir = sh.versioned_dir("runc", &runc);
    sh.run(&format!(
        "install -m 755 {}/runc.{} /usr/local/sbin/runc",
        dir, arch
    ))
    .await?;
    Ok(())
}

pub async fn check_containerd_service(sh: &mut Shell<'_>) -> Result<bool> {
    if !sh
        .probe_ok(&format!("test -f {}", CONTAINERD_UNIT_PATH))
        .await?
    {
        return Ok(false);
    }
    if !sh
        .probe_ok(&format!(
            "grep -q 'SystemdCgroup = true' {}",
            CONTAINERD_CONFIG_PATH
        ))
        .await?
    {
        return Ok(false);
    }
    sh.probe_ok(&format!(
        "grep -q '{}' {}",
        sandbox_image(sh.spec),
        CONTAINERD_CONFIG_PATH
    ))
    .await
}

pub async fn configure_containerd_service(sh: &mut Shell<'_>) -> Result<()> {
    sh.write_file(CONTAINERD_UNIT_PATH, CONTAINERD_UNIT.as_bytes())
        .await?;
    sh.run("mkdir -p /etc/containerd").await?;
    sh.run(&format!(
        "containerd config default > {}",
        CONTAINERD_CONFIG_PATH
    ))
    .await?;
    sh.run(&format!(
        "sed -i 's/SystemdCgroup = false/SystemdCgroup = true/' {}",
        CONTAINERD_CONFIG_PATH
    ))
    .await?;
    // Key is `sandbox_image` in containerd 1.x configs, `sandbox` in 2.x.
    let image = sandbox_image(sh.spec);
    sh.run(&format!(
        "sed -i -E \"s#(sandbox_image|sandbox) = .*#\\1 = '{}'#\" {}",
        image, CONTAINERD_CONFIG_PATH
    ))
    .await?;
    sh.run("systemctl daemon-reload && systemctl enable containerd")
        .await?;
    Ok(())
}

pub async fn check_containerd_running(sh: &mut Shell<'_>) -> Result<bool> {
    match sh.probe("systemctl is-active containerd").await? {
        Some(state) => Ok(state == "active"),
        None => Ok(false),
    }
}

pub async fn start_containerd(sh: &mut Shell<'_>) -> Result<()> {
    sh.run("systemctl restart containerd").await?;
    Ok(())
}

pub async fn check_crictl(sh: &mut Shell<'_>) -> Result<bool> {
    Ok(sh.probe_ok("command -v crictl").await?
        && sh
            .probe_ok(&format!("grep -q 'containerd.sock' {}", CRICTL_CONF_PATH))
            .await?)
}

pub async fn configure_crictl(sh: &mut Shell<'_>) -> Result<()> {
    let version = sh.versions().kubernetes.clone();
    let arch = sh.arch().as_str();
    let dir = sh.versioned_dir("crictl", &version);
    sh.run(&format!(
        "tar -xzf {}/crictl-v{}-linux-{}.tar.gz -C /usr/local/bin",
        dir, version, arch
    ))
    .await?;
    sh.write_file(CRICTL_CONF_PATH, CRICTL_CONFIG.as_bytes())
        .await?;
    Ok(())
}

pub async fn check_nerdctl(sh: &mut Shell<'_>) -> Result<bool> {
    let version = sh.versions().nerdctl.clone();
    sh.probe_contains("nerdctl --version", &version).await
}

pub async fn install_nerdctl(sh: &mut Shell<'_>) -> Result<()> {
    let version = sh.versions().nerdctl.clone();
    let arch = sh.arch().as_str();
    let dir = sh.versioned_dir("nerdctl", &version);
    sh.run(&format!(
        "tar -xzf {}/nerdctl-{}-linux-{}.tar.gz -C /usr/local/bin",
        dir, version, arch
    ))
    .await?;
    Ok(())
}

pub async fn check_accelerator(sh: &mut Shell<'_>) -> Result<bool> {
    if sh.facts.has_gpu && !sh.probe_ok("command -v nvidia-container-runtime").await? {
        return Ok(false);
    }
    if sh.facts.has_npu && !sh.probe_ok("command -v ascend-docker-runtime").await? {
        return Ok(false);
    }
    Ok(true)
}

pub async fn enable_nvidia_runtime(sh: &mut Shell<'_>) -> Result<()> {
    sh.run("nvidia-ctk runtime configure --runtime=containerd --set-as-default")
        .await?;
    sh.run("systemctl restart containerd").await?;
    Ok(())
}

pub async fn enable_ascend_runtime(sh: &mut Shell<'_>) -> Result<()> {
    sh.run("systemctl restart containerd").await?;
    Ok(())
}

pub async fn check_k8s_components(sh: &mut Shell<'_>) -> Result<bool> {
    let version = sh.versions().kubernetes.clone();
    Ok(sh.probe_contains("kubeadm version -o short", &version).await?
        && sh.probe_contains("kubelet --version", &version).await?)
}

pub async fn check_images_loaded(sh: &mut Shell<'_>) -> Result<bool> {
    let required = crate::config::images::required_images(sh.spec)?;
    match sh.probe("ctr -n k8s.io images ls -q").await? {
        Some(listing) => {
            let present: HashSet<&str> = listing.lines().map(str::trim).collect();
            Ok(required.iter().all(|image| present.contains(image.as_str())))
        }
        None => Ok(false),
    }
}

pub async fn load_offline_images(sh: &mut Shell<'_>) -> Result<()> {
    let dir = format!("{}/images", sh.staging());
    sh.run(&format!(
        "for f in {}/*.tar; do ctr -n k8s.io images import \"$f\" || exit 1; done",
        dir
    ))
    .await?;
    Ok(())
}

pub async fn check_helm(sh: &mut Shell<'_>) -> Result<bool> {
    sh.probe_contains("helm version --short", HELM_VERSION).await
}

pub async fn install_helm(sh: &mut Shell<'_>) -> Result<()> {
    let arch = sh.arch().as_str();
    let dir = sh.versioned_dir("helm", HELM_VERSION);
    sh.run(&format!(
        "tar -xzf {}/helm-v{}-linux-{}.tar.gz -C {}",
        dir, HELM_VERSION, arch, dir
    ))
    .await?;
    sh.run(&format!(
        "install -m 755 {}/linux-{}/helm /usr/local/bin/helm",
        dir, arch
    ))
    .await?;
    Ok(())
}
