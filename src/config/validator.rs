// file: src/config/validator.rs
// version: 1.1.0
// guid: f3a82c19-5d47-40be-92e6-7c14d8b05a92

//! Defaulting and validation of the cluster specification
//!
//! Everything here runs before the first SSH connection so topology and
//! credential mistakes surface as validation errors, not mid-run failures.

use super::{
    ClusterSpec, VersionPins, SUPPORTED_CONTAINERD_VERSIONS, SUPPORTED_DOCKER_CE_VERSIONS,
    SUPPORTED_KUBERNETES_VERSIONS, SUPPORTED_NERDCTL_VERSIONS, SUPPORTED_RUNC_VERSIONS,
};
use crate::error::InstallError;
use crate::Result;
use tracing::debug;

/// Fill defaults and validate the whole specification
pub fn apply_defaults_and_validate(spec: &mut ClusterSpec) -> Result<()> {
    debug!("Validating cluster specification");

    if spec.resource_package.is_empty() {
        return Err(InstallError::validation("resource_package is required"));
    }
    if spec.nodes.is_empty() {
        return Err(InstallError::validation("at least one node must be configured"));
    }
    if spec.command_timeout_secs == 0 {
        spec.command_timeout_secs = 600;
    }

    apply_version_defaults(&mut spec.versions)?;
    validate_nodes(spec)?;
    validate_registry(spec)?;
    validate_join_source(spec)?;
    validate_ha(spec)?;

    debug!("Cluster specification is valid");
    Ok(())
}

fn apply_version_defaults(versions: &mut VersionPins) -> Result<()> {
    pin_version(&mut versions.docker_ce, "docker_ce", SUPPORTED_DOCKER_CE_VERSIONS)?;
    pin_version(&mut versions.containerd, "containerd", SUPPORTED_CONTAINERD_VERSIONS)?;
    pin_version(&mut versions.runc, "runc", SUPPORTED_RUNC_VERSIONS)?;
    pin_version(&mut versions.nerdctl, "nerdctl", SUPPORTED_NERDCTL_VERSIONS)?;
    pin_version(&mut versions.kubernetes, "kubernetes", SUPPORTED_KUBERNETES_VERSIONS)?;
    Ok(())
}

fn pin_version(value: &mut String, name: &str, supported: &[&str]) -> Result<()> {
    if value.is_empty() {
        *value = supported[0].to_string();
        return Ok(());
    }
    if !supported.contains(&value.as_str()) {
        return Err(InstallError::Validation(format!(
            "unsupported {} version '{}', supported: {}",
            name,
            value,
            supported.join(", ")
        )));
    }
    Ok(())
}

fn validate_nodes(spec: &mut ClusterSpec) -> Result<()> {
    for node in &mut spec.nodes {
        if node.ip.is_empty() {
            return Err(InstallError::validation("every node needs an ip"));
        }
        if node.password.is_empty() {
            return Err(InstallError::Validation(format!(
                "node {} needs a password",
                node.ip
            )));
        }
        // only masters can be primary
        if !node.is_master {
            node.is_primary_master = false;
        }
    }
    Ok(())
}

fn validate_registry(spec: &ClusterSpec) -> Result<()> {
    let reg = &spec.registry;
    if !reg.enabled() {
        return Ok(());
    }
    if reg.ip.is_empty() || reg.port == 0 || reg.username.is_empty() || reg.password.is_empty() {
        return Err(InstallError::validation(
            "registry requires ip, port, username and password when an endpoint is set",
        ));
    }
    Ok(())
}

fn validate_join_source(spec: &ClusterSpec) -> Result<()> {
    if !spec.has_master() && spec.join_command.as_deref().unwrap_or("").is_empty() {
        return Err(InstallError::validation(
            "join_command is required when no node is a master",
        ));
    }
    Ok(())
}

fn validate_ha(spec: &ClusterSpec) -> Result<()> {
    if !spec.ha.enabled {
        return Ok(());
    }

    let masters = spec.masters();
    if masters.len() != 3 {
        return Err(InstallError::Validation(format!(
            "HA mode requires exactly 3 masters, found {}",
            masters.len()
        )));
    }

    let primaries = masters.iter().filter(|n| n.is_primary_master).count();
    if primaries != 1 {
        return Err(InstallError::Validation(format!(
            "HA mode requires exactly one primary master, found {}",
            primaries
        )));
    }

    if spec.ha.virtual_ip.trim().is_empty() {
        return Err(InstallError::validation("HA mode requires a virtual_ip"));
    }

    for master in masters {
        if master.interface.as_deref().unwrap_or("").is_empty() {
            return Err(InstallError::Validation(format!(
                "HA master {} needs a network interface for the VIP",
                master.ip
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeSpec;

    fn node(ip: &str, master: bool, primary: bool) -> NodeSpec {
        NodeSpec {
            ip: ip.to_string(),
            password: "pw".to_string(),
            user: None,
            ssh_port: None,
            interface: Some("eth0".to_string()),
            is_master: master,
            is_primary_master: primary,
        }
    }

    fn valid_spec() -> ClusterSpec {
        let mut spec: ClusterSpec =
            serde_yaml::from_str("resource_package: /opt/resources.tar.gz").unwrap();
        spec.nodes = vec![node("10.0.0.1", true, false), node("10.0.0.2", false, false)];
        spec
    }

    fn valid_ha_spec() -> ClusterSpec {
        let mut spec = valid_spec();
        spec.ha.enabled = true;
        spec.ha.virtual_ip = "10.0.0.100/24".to_string();
        spec.nodes = vec![
            node("10.0.0.1", true, true),
            node("10.0.0.2", true, false),
            node("10.0.0.3", true, false),
            node("10.0.0.4", false, false),
        ];
        spec
    }

    #[test]
    fn test_valid_spec_passes_and_pins_versions() {
        let mut spec = valid_spec();
        apply_defaults_and_validate(&mut spec).unwrap();
        assert_eq!(spec.versions.containerd, "2.2.1");
        assert_eq!(spec.versions.kubernetes, "1.35.0");
    }

    #[test]
    fn test_valid_ha_spec_passes() {
        let mut spec = valid_ha_spec();
        apply_defaults_and_validate(&mut spec).unwrap();
    }

    #[test]
    fn test_rejections() {
        // (mutation, expected error fragment)
        let cases: Vec<(fn(&mut ClusterSpec), &str)> = vec![
            (|s| s.resource_package.clear(), "resource_package"),
            (|s| s.nodes.clear(), "at least one node"),
            (|s| s.nodes[0].ip.clear(), "needs an ip"),
            (|s| s.nodes[0].password.clear(), "needs a password"),
            (
                |s| s.versions.kubernetes = "9.9.9".to_string(),
                "unsupported kubernetes version",
            ),
            (
                |s| {
                    s.registry.endpoint = "harbor.local".to_string();
                    s.registry.port = 0;
                },
                "registry requires",
            ),
            (
                |s| {
                    for n in &mut s.nodes {
                        n.is_master = false;
                    }
                },
                "join_command is required",
            ),
        ];

        for (mutate, fragment) in cases {
            let mut spec = valid_spec();
            mutate(&mut spec);
            let err = apply_defaults_and_validate(&mut spec).unwrap_err();
            assert!(
                err.to_string().contains(fragment),
                "expected '{}' in '{}'",
                fragment,
                err
            );
        }
    }

    #[test]
    fn test_ha_rejections() {
        let cases: Vec<(fn(&mut ClusterSpec), &str)> = vec![
            (|s| s.nodes[2].is_master = false, "exactly 3 masters"),
            (
                |s| s.nodes[1].is_primary_master = true,
                "exactly one primary master",
            ),
            (|s| s.nodes[0].is_primary_master = false, "exactly one primary master"),
            (|s| s.ha.virtual_ip = "  ".to_string(), "virtual_ip"),
            (|s| s.nodes[1].interface = None, "network interface"),
        ];

        for (mutate, fragment) in cases {
            let mut spec = valid_ha_spec();
            mutate(&mut spec);
            let err = apply_defaults_and_validate(&mut spec).unwrap_err();
            assert!(
                err.to_string().contains(fragment),
                "expected '{}' in '{}'",
                fragment,
                err
            );
        }
    }

    #[test]
    fn test_primary_flag_cleared_on_workers() {
        let mut spec = valid_spec();
        spec.nodes[1].is_primary_master = true;
        apply_defaults_and_validate(&mut spec).unwrap();
        assert!(!spec.nodes[1].is_primary_master);
    }
}
