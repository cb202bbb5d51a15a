// file: src/cli/args.rs
// version: 1.2.0
// guid: f6g7h8i9-j0k1-2345-6789-012345fghijk

//! Command line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "k8s-airgap-installer")]
#[command(about = "Offline Kubernetes cluster installer for SSH-reachable fleets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision the fleet described by a cluster config
    Install {
        /// Cluster config YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Plan and check every step without changing remote state
        #[arg(long)]
        dry_run: bool,

        /// Write a plain-text report with per-node transcripts
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate a cluster config without touching any node
    Validate {
        /// Cluster config YAML
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the container images the configured cluster requires
    ListImages {
        /// Cluster config YAML; without it only the baseline set prints
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
