// file: src/config/mod.rs
// version: 1.2.0
// guid: b7e13d52-4c88-49a1-bd02-6f5a90c3e7d8

//! Configuration module for the offline Kubernetes installer
//!
//! Holds the cluster specification loaded from YAML, the version pin
//! catalog, and the validation that runs before any SSH connection is made.

pub mod images;
pub mod loader;
pub mod validator;

pub use loader::ConfigLoader;
pub use validator::apply_defaults_and_validate;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote staging directory every offline asset is unpacked into
pub const REMOTE_STAGING_DIR: &str = "/tmp/k8s-offline-install";

/// File name of the offline bundle once uploaded to a node
pub const RESOURCE_ARCHIVE: &str = "resources.tar.gz";

/// Marker file recording the bundle hash after a successful extraction
pub const EXTRACT_MARKER: &str = ".extracted_success";

/// Image repository used by kubeadm when no private registry is configured
pub const DEFAULT_IMAGE_REPOSITORY: &str = "registry.aliyuncs.com/google_containers";

/// Sandbox image containerd is pointed at, tag matching the k8s baseline
pub const PAUSE_IMAGE: &str = "pause:3.10.1";

/// Helm version shipped in the offline bundle
pub const HELM_VERSION: &str = "3.16.2";

/// Port the kube-apiserver listens on directly
pub const APISERVER_PORT: u16 = 6443;

/// Port HAProxy fronts the API servers on (must differ from 6443 because
/// the LB runs on the masters themselves)
pub const LB_APISERVER_PORT: u16 = 16443;

pub const SUPPORTED_DOCKER_CE_VERSIONS: &[&str] = &["29.2.0"];
pub const SUPPORTED_CONTAINERD_VERSIONS: &[&str] = &["2.2.1"];
pub const SUPPORTED_RUNC_VERSIONS: &[&str] = &["1.3.4"];
pub const SUPPORTED_NERDCTL_VERSIONS: &[&str] = &["2.2.1"];
pub const SUPPORTED_KUBERNETES_VERSIONS: &[&str] = &["1.35.0"];

/// Supported machine architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl Architecture {
    /// Get the architecture as the string used in asset paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl std::str::FromStr for Architecture {
    type Err = crate::error::InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" | "x86_64" => Ok(Architecture::Amd64),
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            _ => Err(crate::error::InstallError::Validation(format!(
                "Unknown architecture: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run is allowed to do on the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InstallMode {
    /// OS baseline + runtime + Kubernetes + bootstrap + addons
    #[default]
    #[serde(rename = "full")]
    Full,
    /// Deploy addons against an already-bootstrapped cluster
    #[serde(rename = "addons-only")]
    AddonsOnly,
    /// OS baseline + runtime + Kubernetes only, no bootstrap, no addons
    #[serde(rename = "install-only", alias = "pre-init")]
    InstallOnly,
}

impl InstallMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMode::Full => "full",
            InstallMode::AddonsOnly => "addons-only",
            InstallMode::InstallOnly => "install-only",
        }
    }
}

/// One machine in the fleet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Address the node is dialed at
    pub ip: String,

    /// SSH password for the configured user
    #[serde(default)]
    pub password: String,

    /// Per-node SSH user override
    #[serde(default)]
    pub user: Option<String>,

    /// Per-node SSH port override
    #[serde(default)]
    pub ssh_port: Option<u16>,

    /// Network interface Keepalived binds the VIP to (HA masters only)
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default)]
    pub is_master: bool,

    /// Designated bootstrap master; meaningful only when HA is enabled
    #[serde(default)]
    pub is_primary_master: bool,
}

/// Private registry the cluster pulls from; configured iff `endpoint` is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl RegistryConfig {
    pub fn enabled(&self) -> bool {
        !self.endpoint.is_empty()
    }

    /// Host prefix images are rewritten under, `endpoint:port`
    pub fn host(&self) -> String {
        format!("{}:{}", self.endpoint, self.port)
    }
}

/// Highly-available control plane settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HaConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Virtual IP floated between masters, optionally CIDR-suffixed
    #[serde(default)]
    pub virtual_ip: String,
}

/// A single addon toggle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// Cluster addons deployed from the primary execution node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonsConfig {
    #[serde(default)]
    pub kube_ovn: AddonSpec,
    #[serde(default)]
    pub multus_cni: AddonSpec,
    #[serde(default)]
    pub kube_prometheus_stack: AddonSpec,
    #[serde(default)]
    pub hami: AddonSpec,
    #[serde(default)]
    pub hami_webui: AddonSpec,
    #[serde(default)]
    pub ascend_device_plugin: AddonSpec,
}

/// Component version pins, validated against the supported lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPins {
    #[serde(default)]
    pub docker_ce: String,
    #[serde(default)]
    pub containerd: String,
    #[serde(default)]
    pub runc: String,
    #[serde(default)]
    pub nerdctl: String,
    #[serde(default)]
    pub kubernetes: String,
}

/// The whole fleet specification, loaded once per process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Default SSH user for nodes without an override
    #[serde(default = "default_user")]
    pub user: String,

    /// Default SSH port for nodes without an override
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Upper bound for any single remote command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Path to the local offline asset bundle (tar.gz)
    #[serde(default)]
    pub resource_package: String,

    #[serde(default)]
    pub install_mode: InstallMode,

    /// Pre-seeded worker join command for fleets with no master
    #[serde(default)]
    pub join_command: Option<String>,

    #[serde(default)]
    pub versions: VersionPins,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub ha: HaConfig,

    #[serde(default)]
    pub addons: AddonsConfig,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_command_timeout() -> u64 {
    600
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            user: default_user(),
            ssh_port: default_ssh_port(),
            command_timeout_secs: default_command_timeout(),
            resource_package: String::new(),
            install_mode: InstallMode::default(),
            join_command: None,
            versions: VersionPins::default(),
            registry: RegistryConfig::default(),
            ha: HaConfig::default(),
            addons: AddonsConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl ClusterSpec {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn masters(&self) -> Vec<&NodeSpec> {
        self.nodes.iter().filter(|n| n.is_master).collect()
    }

    pub fn master_ips(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.is_master)
            .map(|n| n.ip.clone())
            .collect()
    }

    pub fn has_master(&self) -> bool {
        self.nodes.iter().any(|n| n.is_master)
    }

    /// The single master responsible for bootstrap and addon installation:
    /// the designated primary when HA is on, any master when it is off.
    pub fn is_primary_execution_node(&self, node: &NodeSpec) -> bool {
        node.is_master && (!self.ha.enabled || node.is_primary_master)
    }

    /// VIP with any CIDR suffix stripped, usable as a host in an endpoint
    pub fn virtual_ip_host(&self) -> &str {
        match self.ha.virtual_ip.split_once('/') {
            Some((host, _)) => host,
            None => &self.ha.virtual_ip,
        }
    }

    /// Repository kubeadm pulls control-plane images from
    pub fn image_repository(&self) -> String {
        if self.registry.enabled() {
            format!("{}/google_containers", self.registry.host())
        } else {
            DEFAULT_IMAGE_REPOSITORY.to_string()
        }
    }

    pub fn node_user<'a>(&'a self, node: &'a NodeSpec) -> &'a str {
        node.user.as_deref().unwrap_or(&self.user)
    }

    pub fn node_port(&self, node: &NodeSpec) -> u16 {
        node.ssh_port.unwrap_or(self.ssh_port)
    }
}
