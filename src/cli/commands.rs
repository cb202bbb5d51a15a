// file: src/cli/commands.rs
// version: 1.2.0
// guid: g7h8i9j0-k1l2-3456-7890-123456ghijkl

//! Command implementations for the CLI

use crate::{
    config::{images, loader::ConfigLoader, ClusterSpec},
    network::SshConnector,
    provision::run_fleet,
    registry::plan_sync_items,
    reporter::{print_summary, write_report_file, NodeOutcome},
};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Provision the whole fleet and print the per-node summary
pub async fn install_command(config: &Path, dry_run: bool, report: Option<&Path>) -> Result<()> {
    let spec = ConfigLoader::new()
        .load_cluster_spec(config)
        .with_context(|| format!("loading cluster config {}", config.display()))?;
    info!(
        nodes = spec.nodes.len(),
        mode = spec.install_mode.as_str(),
        dry_run,
        "starting fleet install"
    );

    let spec = Arc::new(spec);
    let fleet = run_fleet(Arc::clone(&spec), Arc::new(SshConnector), dry_run).await?;

    print_summary(&fleet.reports);
    if let Some(path) = report {
        write_report_file(path, &fleet.reports, &fleet.transcripts)
            .with_context(|| format!("writing report {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    // Dry runs report "would execute" without failing; a node that could
    // not even be checked still counts as a failure.
    let failed: Vec<&str> = fleet
        .reports
        .iter()
        .filter(|r| r.outcome != NodeOutcome::Completed)
        .map(|r| r.ip.as_str())
        .collect();
    if !failed.is_empty() {
        bail!(
            "install incomplete on {} node(s): {}",
            failed.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

/// Load and validate a cluster config, reporting the resolved topology
pub async fn validate_command(config: &Path) -> Result<()> {
    let spec = ConfigLoader::new()
        .load_cluster_spec(config)
        .with_context(|| format!("loading cluster config {}", config.display()))?;
    let masters = spec.masters().len();
    println!(
        "config ok: {} node(s), {} master(s), mode {}, HA {}",
        spec.nodes.len(),
        masters,
        spec.install_mode.as_str(),
        if spec.ha.enabled { "on" } else { "off" }
    );
    if spec.registry.enabled() {
        println!("registry mirror: {}", spec.registry.host());
    }
    Ok(())
}

/// Print the image set the configured cluster requires
pub async fn list_images_command(config: Option<&Path>, json: bool) -> Result<()> {
    let spec = match config {
        Some(path) => ConfigLoader::new()
            .load_cluster_spec(path)
            .with_context(|| format!("loading cluster config {}", path.display()))?,
        None => ClusterSpec::default(),
    };
    let required = images::required_images(&spec)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&required)?);
        return Ok(());
    }
    if spec.registry.enabled() {
        for item in plan_sync_items(&spec)? {
            println!("{} -> {}", item.source, item.target);
        }
    } else {
        for image in required {
            println!("{}", image);
        }
    }
    Ok(())
}
