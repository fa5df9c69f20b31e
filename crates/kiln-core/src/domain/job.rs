//! Job descriptors, per-job state machine, and the job record.

use serde::{Deserialize, Serialize};

use super::asset::{GeneratedAsset, InputAsset};
use super::ids::JobId;
use crate::error::GenerateError;

/// What one generation job should produce.
///
/// Descriptors are validated when the batch is constructed (non-empty label),
/// and are immutable once the job starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Human-readable description of the slot (shot name or scene title).
    pub label: String,

    /// Prompt text sent to the generation model.
    pub prompt: String,

    /// Input assets, in the order they should appear in the request.
    #[serde(default)]
    pub assets: Vec<InputAsset>,
}

impl JobDescriptor {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
            assets: Vec::new(),
        }
    }

    pub fn with_asset(mut self, asset: InputAsset) -> Self {
        self.assets.push(asset);
        self
    }
}

/// Why a job ended up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// A transient upstream failure that survived the whole retry budget.
    Transient,

    /// A non-retryable failure (bad input, auth, malformed response).
    Terminal,

    /// The batch was cancelled before this slot finished.
    Cancelled,
}

/// Terminal failure information for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub cause: FailureCause,

    /// Human-readable message, suitable for inline per-slot rendering.
    pub message: String,
}

impl JobFailure {
    pub fn cancelled() -> Self {
        Self {
            cause: FailureCause::Cancelled,
            message: "generation cancelled".to_string(),
        }
    }

    /// Classify the final error of a slot.
    ///
    /// A transient error only reaches this point once its retry budget is
    /// spent, so `Transient` here always means "exhausted retries".
    pub fn classify(error: &GenerateError) -> Self {
        let cause = match error {
            GenerateError::Cancelled => FailureCause::Cancelled,
            _ if error.is_transient() => FailureCause::Transient,
            _ => FailureCause::Terminal,
        };
        Self {
            cause,
            message: error.to_string(),
        }
    }
}

/// Job state.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> Failed
///
/// Transitions are forward-only; a job never re-enters Pending and a
/// terminal state is never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Created, not yet submitted.
    Pending,

    /// Submitted; covers the stagger wait and the remote call itself.
    Running,

    /// The generation call produced a result.
    Succeeded { result: GeneratedAsset },

    /// The generation call failed terminally for this slot.
    Failed { error: JobFailure },
}

impl JobState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded { .. } | JobState::Failed { .. })
    }
}

/// Metadata + state for one job slot.
///
/// Design:
/// - This is the single source of truth for a slot; observers only ever see
///   cloned [`JobSnapshot`]s.
/// - All state transitions happen through methods, which enforce the
///   forward-only rule by ignoring anything else.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: JobId,

    /// Submission index; result slot `index` belongs to this job forever.
    pub index: usize,

    pub descriptor: JobDescriptor,
    pub state: JobState,

    /// Number of attempts the invoker made before the slot settled.
    pub attempts: u32,
}

impl JobRecord {
    pub fn new(job_id: JobId, index: usize, descriptor: JobDescriptor) -> Self {
        Self {
            job_id,
            index,
            descriptor,
            state: JobState::Pending,
            attempts: 0,
        }
    }

    /// Pending -> Running.
    pub fn start(&mut self) {
        if matches!(self.state, JobState::Pending) {
            self.state = JobState::Running;
        }
    }

    /// Running -> Succeeded. First terminal outcome wins.
    pub fn succeed(&mut self, result: GeneratedAsset, attempts: u32) {
        if !self.state.is_terminal() {
            self.attempts = attempts;
            self.state = JobState::Succeeded { result };
        }
    }

    /// Running -> Failed. First terminal outcome wins.
    pub fn fail(&mut self, error: JobFailure, attempts: u32) {
        if !self.state.is_terminal() {
            self.attempts = attempts;
            self.state = JobState::Failed { error };
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            index: self.index,
            label: self.descriptor.label.clone(),
            state: self.state.clone(),
            attempts: self.attempts,
        }
    }
}

/// Observer-facing view of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub index: usize,
    pub label: String,
    pub state: JobState,
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(JobId::generate(), 0, JobDescriptor::new("hero shot", "a shoe"))
    }

    #[test]
    fn new_job_starts_pending() {
        let job = record();
        assert_eq!(job.state, JobState::Pending);
        assert!(!job.state.is_terminal());
    }

    #[test]
    fn start_then_succeed() {
        let mut job = record();
        job.start();
        assert_eq!(job.state, JobState::Running);

        job.succeed(GeneratedAsset::text("text/plain", "copy"), 2);
        assert!(job.state.is_terminal());
        assert_eq!(job.attempts, 2);
    }

    #[test]
    fn terminal_state_is_never_overwritten() {
        let mut job = record();
        job.start();
        job.succeed(GeneratedAsset::text("text/plain", "copy"), 1);

        job.fail(JobFailure::cancelled(), 9);

        assert!(matches!(job.state, JobState::Succeeded { .. }));
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn job_never_reenters_pending_after_failure() {
        let mut job = record();
        job.start();
        job.fail(JobFailure::cancelled(), 1);

        job.start();

        assert!(matches!(job.state, JobState::Failed { .. }));
    }

    #[test]
    fn classify_maps_cancellation_and_transience() {
        let cancelled = JobFailure::classify(&GenerateError::Cancelled);
        assert_eq!(cancelled.cause, FailureCause::Cancelled);

        let transient = JobFailure::classify(&GenerateError::upstream("Error 429"));
        assert_eq!(transient.cause, FailureCause::Transient);

        let terminal = JobFailure::classify(&GenerateError::upstream("Invalid API key"));
        assert_eq!(terminal.cause, FailureCause::Terminal);
        assert_eq!(terminal.message, "Invalid API key");
    }
}
