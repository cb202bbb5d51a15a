// file: src/config/images.rs
// version: 1.1.0
// guid: 6e92b0d4-17f8-4c35-a6b1-84dfe2097c53

//! Embedded image catalog
//!
//! Groups are keyed `<component>-images`. The baseline `k8s-images` group is
//! always required; addon groups join the required set when their addon is
//! enabled. The same catalog feeds registry synchronization and the Helm
//! values rewriting done during addon deployment.

use super::ClusterSpec;
use crate::Result;
use std::collections::BTreeMap;

const CATALOG_YAML: &str = include_str!("images.yaml");

/// Group name of the baseline Kubernetes control-plane images
pub const K8S_IMAGE_GROUP: &str = "k8s-images";

/// Parse the embedded catalog into group -> image list
pub fn image_groups() -> Result<BTreeMap<String, Vec<String>>> {
    let groups: BTreeMap<String, Vec<String>> = serde_yaml::from_str(CATALOG_YAML)?;
    Ok(groups)
}

/// The full image set this cluster needs, baseline plus enabled addons,
/// in a stable catalog order.
pub fn required_images(spec: &ClusterSpec) -> Result<Vec<String>> {
    let groups = image_groups()?;
    let mut images = Vec::new();

    for name in enabled_groups(spec) {
        if let Some(list) = groups.get(name) {
            images.extend(list.iter().cloned());
        }
    }

    Ok(images)
}

/// Group names active for this spec, baseline first
pub fn enabled_groups(spec: &ClusterSpec) -> Vec<&'static str> {
    let addons = &spec.addons;
    let mut names = vec![K8S_IMAGE_GROUP];
    if addons.kube_ovn.enabled {
        names.push("kube-ovn-images");
    }
    if addons.multus_cni.enabled {
        names.push("multus-cni-images");
    }
    if addons.kube_prometheus_stack.enabled {
        names.push("kube-prometheus-stack-images");
    }
    if addons.hami.enabled {
        names.push("hami-images");
    }
    if addons.hami_webui.enabled {
        names.push("hami-webui-images");
    }
    if addons.ascend_device_plugin.enabled {
        names.push("ascend-device-plugin-images");
    }
    names
}
