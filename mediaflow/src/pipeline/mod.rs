//! Resumable pipeline execution.
//!
//! [`PipelineCoordinator`] owns the step state machine:
//!
//! ```text
//! pending --start--> processing --complete--> completed
//!                    processing --fail-----> failed --reset--> pending
//! pending | failed --skip--> skipped
//! ```
//!
//! [`StageRunner`] is the queue-facing entry point that claims the next step,
//! dispatches it to a [`StageHandler`] and records the outcome.

mod coordinator;
mod generation;
mod integration_tests;
mod report;
mod runner;

pub use coordinator::PipelineCoordinator;
pub use generation::GenerationStage;
pub use report::PipelineStatusReport;
pub use runner::{AdvanceOutcome, StageHandler, StageRunner};

use crate::core::StepName;
use crate::ledger::PipelineStepRecord;

/// Resume cursor over a ledger.
///
/// Walks rows in template order past settled steps. Returns the first row if
/// it is pending or failed, and `None` if it is processing or every row is
/// settled, so a step is never offered before its predecessors are done.
pub(crate) fn next_actionable(steps: &[PipelineStepRecord]) -> Option<StepName> {
    let mut ordered: Vec<&PipelineStepRecord> = steps.iter().collect();
    ordered.sort_by_key(|s| s.step_order);
    ordered
        .into_iter()
        .find(|s| !s.status.is_settled())
        .filter(|s| s.status.is_actionable())
        .map(|s| s.step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepStatus;
    use uuid::Uuid;

    fn ledger(statuses: &[StepStatus]) -> Vec<PipelineStepRecord> {
        let job_id = Uuid::new_v4();
        StepName::ALL
            .iter()
            .zip(statuses)
            .zip(1u32..)
            .map(|((step, status), order)| {
                let mut row = PipelineStepRecord::new(job_id, *step, order);
                row.status = *status;
                row
            })
            .collect()
    }

    #[test]
    fn test_cursor_skips_settled_prefix() {
        use StepStatus::{Completed, Failed, Pending, Skipped};
        let rows = ledger(&[Completed, Skipped, Failed, Pending, Pending]);
        assert_eq!(next_actionable(&rows), Some(StepName::Video));
    }

    #[test]
    fn test_cursor_blocks_behind_processing() {
        use StepStatus::{Completed, Pending, Processing};
        let rows = ledger(&[Completed, Processing, Pending, Pending, Pending]);
        assert_eq!(next_actionable(&rows), None);
    }

    #[test]
    fn test_cursor_ignores_row_order() {
        use StepStatus::{Completed, Pending};
        let mut rows = ledger(&[Completed, Pending, Pending, Pending, Pending]);
        rows.reverse();
        assert_eq!(next_actionable(&rows), Some(StepName::Images));
    }

    #[test]
    fn test_cursor_done() {
        assert_eq!(next_actionable(&ledger(&[StepStatus::Completed; 5])), None);
        assert_eq!(next_actionable(&[]), None);
    }
}
