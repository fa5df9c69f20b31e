//! Batch-level views aggregated from job slots.

use serde::{Deserialize, Serialize};

use super::ids::BatchId;
use super::job::{JobSnapshot, JobState};

/// Counts by slot state, for progress rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Point-in-time view of a whole batch.
///
/// Snapshots are cheap clones published on every slot transition; slot order
/// always matches submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub batch_id: BatchId,
    pub jobs: Vec<JobSnapshot>,
}

impl BatchSnapshot {
    /// The slot at submission index `index`.
    pub fn job(&self, index: usize) -> Option<&JobSnapshot> {
        self.jobs.get(index)
    }

    /// A batch is settled once every slot has left Pending/Running.
    pub fn is_settled(&self) -> bool {
        self.jobs.iter().all(|job| job.state.is_terminal())
    }

    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts::default();
        for job in &self.jobs {
            match job.state {
                JobState::Pending => counts.pending += 1,
                JobState::Running => counts.running += 1,
                JobState::Succeeded { .. } => counts.succeeded += 1,
                JobState::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}
