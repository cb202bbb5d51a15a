// file: src/lib.rs
// version: 1.2.0
// guid: d82472d1-7f0f-4eb4-b0a3-6e1547103eb4

//! # k8s-airgap-installer
//!
//! Provisions a Kubernetes cluster across SSH-reachable bare machines
//! with no internet access. Every binary and image ships in a local
//! offline bundle; every remote action is an idempotent check-then-apply
//! step, so the installer can be re-run safely against partially
//! provisioned fleets.

pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod logging;
pub mod network;
pub mod provision;
pub mod registry;
pub mod reporter;
pub mod testing;

pub use error::{InstallError, Result};

/// Version information for the installer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
