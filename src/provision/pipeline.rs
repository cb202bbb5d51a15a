// file: src/provision/pipeline.rs
// version: 1.2.0
// guid: b5d82e07-1f94-4c6a-ae38-60c7f2d9b481

//! Check-then-apply step execution
//!
//! Every step runs the same way: check first, apply only when the check
//! says the state is missing. A failing check is fatal on the spot; it
//! means the node cannot even be inspected, and applying blind would
//! make things worse. Dry runs report what an apply would do and touch
//! nothing.

use crate::provision::plan::StepKind;
use crate::reporter::RunLog;
use crate::{InstallError, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// One node's step executor. `check` must not mutate remote state.
#[async_trait]
pub trait StepRunner: Send {
    fn transcript(&mut self) -> &mut RunLog;
    async fn check(&mut self, step: StepKind) -> Result<bool>;
    async fn apply(&mut self, step: StepKind) -> Result<()>;
}

/// Drive a planned step list to completion or first failure
pub async fn run_pipeline(
    runner: &mut dyn StepRunner,
    steps: &[StepKind],
    dry_run: bool,
) -> Result<()> {
    let total = steps.len();
    for (index, step) in steps.iter().enumerate() {
        let title = step.title();
        runner.transcript().step_start(index + 1, total, title);

        let satisfied = match runner.check(*step).await {
            Ok(satisfied) => satisfied,
            Err(e) => {
                runner.transcript().step_failed(title);
                return Err(InstallError::in_step(title, Duration::ZERO, e));
            }
        };
        if satisfied {
            debug!(step = title, "state already satisfied");
            runner.transcript().step_skipped(title);
            continue;
        }
        if dry_run {
            runner.transcript().step_would_run(title);
            continue;
        }

        let started = Instant::now();
        match runner.apply(*step).await {
            Ok(()) => runner.transcript().step_done(title, started.elapsed()),
            Err(e) => {
                runner.transcript().step_failed(title);
                return Err(InstallError::in_step(title, started.elapsed(), e));
            }
        }
    }
    Ok(())
}
