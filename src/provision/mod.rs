// file: src/provision/mod.rs
// version: 1.0.0
// guid: 04d7f3b8-62c1-4e95-ba30-9a58e1d72c06

//! Node provisioning: planning, execution and fleet scheduling
//!
//! The scheduler drives one [`run::NodeRun`] per node. Each run plans its
//! steps from the spec and the node's probed facts, then executes them
//! through the check-then-apply pipeline. Join artifacts flow from the
//! primary master's run to every later run by value, never through
//! shared mutable state.

pub mod addons;
pub mod bootstrap;
pub mod loadbalancer;
pub mod pipeline;
pub mod plan;
pub mod resources;
pub mod run;
pub mod scheduler;

pub use bootstrap::JoinArtifacts;
pub use plan::{plan_steps, StepKind};
pub use run::{NodeRun, RunContext};
pub use scheduler::{run_fleet, FleetReport};
