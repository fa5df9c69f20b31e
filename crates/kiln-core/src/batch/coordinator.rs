//! Fan-out batch coordinator.
//!
//! Expands a list of job descriptors into independent generation tasks,
//! staggers their start times to avoid bursting the upstream rate limiter,
//! and tracks every slot's lifecycle separately so one failure never takes
//! the batch down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, watch};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::domain::{
    BatchCounts, BatchId, BatchSnapshot, JobDescriptor, JobFailure, JobId, JobRecord,
};
use crate::error::BatchError;
use crate::generate::{ContentPart, GenerateClient, GenerateRequest, GenerationConfig, ModelId};
use crate::retry::{BackoffPolicy, RetryingInvoker};

/// Knobs for one coordinator.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Model every job in the batch is sent to.
    pub model: ModelId,

    /// Generation config attached to every request.
    pub generation: GenerationConfig,

    /// Per-index start delay: job `i` does not call upstream before
    /// `i * stagger` after submit.
    pub stagger: Duration,

    /// Optional ceiling on simultaneous in-flight calls. `None` means pure
    /// fan-out: the stagger is the only thing smoothing the burst.
    pub max_in_flight: Option<usize>,

    /// Retry policy applied to each job's call.
    pub backoff: BackoffPolicy,
}

impl BatchConfig {
    pub fn new(model: ModelId) -> Self {
        Self {
            model,
            generation: GenerationConfig::default(),
            stagger: Duration::from_millis(500),
            max_in_flight: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Shared per-batch state.
///
/// Tasks write only to their own slot; the slot vector is the single source
/// of truth and observers get cloned snapshots through the watch channel.
struct BatchShared {
    batch_id: BatchId,
    jobs: Mutex<Vec<JobRecord>>,
    snapshot_tx: watch::Sender<BatchSnapshot>,
    cancel: CancelFlag,
    limiter: Option<Arc<Semaphore>>,
}

impl BatchShared {
    /// Apply a transition to one slot and publish a fresh snapshot.
    async fn transition<F: FnOnce(&mut JobRecord)>(&self, index: usize, apply: F) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(index) {
            apply(job);
        }
        let snapshot = BatchSnapshot {
            batch_id: self.batch_id,
            jobs: jobs.iter().map(JobRecord::snapshot).collect(),
        };
        // ignore send error: the caller may have discarded its handle
        let _ = self.snapshot_tx.send(snapshot);
    }
}

/// Issues N independent generation jobs per batch.
pub struct BatchCoordinator<C: ?Sized> {
    client: Arc<C>,
    config: BatchConfig,
}

impl<C: GenerateClient + ?Sized + 'static> BatchCoordinator<C> {
    pub fn new(client: Arc<C>, config: BatchConfig) -> Self {
        Self { client, config }
    }

    /// Validate descriptors, mark every slot observable, and spawn one task
    /// per job. Returns immediately; progress streams through the handle.
    pub fn submit(&self, descriptors: Vec<JobDescriptor>) -> Result<BatchHandle, BatchError> {
        if descriptors.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        for (index, descriptor) in descriptors.iter().enumerate() {
            if descriptor.label.trim().is_empty() {
                return Err(BatchError::EmptyLabel { index });
            }
        }

        let batch_id = BatchId::generate();
        let mut records: Vec<JobRecord> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| JobRecord::new(JobId::generate(), index, descriptor))
            .collect();

        // Every slot is in progress from the observer's point of view the
        // moment the batch is submitted; the stagger only delays the call.
        for record in &mut records {
            record.start();
        }

        let job_inputs: Vec<JobDescriptor> = records
            .iter()
            .map(|record| record.descriptor.clone())
            .collect();
        let initial = BatchSnapshot {
            batch_id,
            jobs: records.iter().map(JobRecord::snapshot).collect(),
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let shared = Arc::new(BatchShared {
            batch_id,
            jobs: Mutex::new(records),
            snapshot_tx,
            cancel: CancelFlag::new(),
            limiter: self
                .config
                .max_in_flight
                .map(|n| Arc::new(Semaphore::new(n.max(1)))),
        });

        info!(
            batch_id = %batch_id,
            jobs = job_inputs.len(),
            stagger_ms = self.config.stagger.as_millis() as u64,
            "submitting generation batch"
        );

        for (index, descriptor) in job_inputs.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            let client = Arc::clone(&self.client);
            let config = self.config.clone();
            let start_delay = config.stagger * index as u32;
            tokio::spawn(run_job(shared, client, config, index, descriptor, start_delay));
        }

        Ok(BatchHandle { shared, snapshot_rx })
    }
}

/// One slot's full lifecycle: stagger wait, optional permit, retried call,
/// terminal transition. Never propagates an error; failures land in the
/// slot and nowhere else.
async fn run_job<C: GenerateClient + ?Sized>(
    shared: Arc<BatchShared>,
    client: Arc<C>,
    config: BatchConfig,
    index: usize,
    descriptor: JobDescriptor,
    start_delay: Duration,
) {
    if !start_delay.is_zero() {
        tokio::select! {
            _ = shared.cancel.cancelled() => {}
            _ = tokio::time::sleep(start_delay) => {}
        }
    }
    if shared.cancel.is_cancelled() {
        shared
            .transition(index, |job| job.fail(JobFailure::cancelled(), 0))
            .await;
        return;
    }

    // The permit is acquired after the stagger so the ramp shapes start
    // times and the cap only bounds simultaneous in-flight calls.
    let _permit = match &shared.limiter {
        Some(limiter) => {
            let limiter = Arc::clone(limiter);
            tokio::select! {
                _ = shared.cancel.cancelled() => {
                    shared
                        .transition(index, |job| job.fail(JobFailure::cancelled(), 0))
                        .await;
                    return;
                }
                permit = limiter.acquire_owned() => permit.ok(),
            }
        }
        None => None,
    };

    let request = build_request(&config, &descriptor);
    let invoker = RetryingInvoker::with_cancel(config.backoff.clone(), shared.cancel.clone());
    let attempts = Arc::new(AtomicU32::new(0));

    let op_attempts = Arc::clone(&attempts);
    let op_client = Arc::clone(&client);
    let outcome = invoker
        .invoke(move || {
            op_attempts.fetch_add(1, Ordering::Relaxed);
            let client = Arc::clone(&op_client);
            let request = request.clone();
            async move { client.generate(request).await }
        })
        .await;

    let attempts = attempts.load(Ordering::Relaxed);
    match outcome {
        Ok(result) => {
            debug!(batch_id = %shared.batch_id, index, attempts, "generation job succeeded");
            shared
                .transition(index, |job| job.succeed(result, attempts))
                .await;
        }
        Err(error) => {
            warn!(
                batch_id = %shared.batch_id,
                index,
                attempts,
                error = %error,
                "generation job failed"
            );
            let failure = JobFailure::classify(&error);
            shared
                .transition(index, |job| job.fail(failure, attempts))
                .await;
        }
    }
}

fn build_request(config: &BatchConfig, descriptor: &JobDescriptor) -> GenerateRequest {
    let mut request = GenerateRequest::new(config.model.clone())
        .with_config(config.generation.clone())
        .with_part(ContentPart::text(descriptor.prompt.clone()));
    for asset in &descriptor.assets {
        request = request.with_part(ContentPart::inline_image(
            asset.media_type.clone(),
            asset.data.clone(),
        ));
    }
    request
}

/// Caller-facing handle to a submitted batch.
///
/// Dropping the handle abandons observation but does not stop the jobs; use
/// [`BatchHandle::cancel`] for that.
pub struct BatchHandle {
    shared: Arc<BatchShared>,
    snapshot_rx: watch::Receiver<BatchSnapshot>,
}

impl std::fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("batch_id", &self.shared.batch_id)
            .finish_non_exhaustive()
    }
}

impl BatchHandle {
    pub fn batch_id(&self) -> BatchId {
        self.shared.batch_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> BatchSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn counts(&self) -> BatchCounts {
        self.snapshot_rx.borrow().counts()
    }

    /// A receiver that yields a fresh snapshot on every slot transition.
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Request cancellation. Slots whose call is already in flight finish
    /// that attempt; everything else settles as failed-with-cancelled.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// Resolves once every slot is terminal. Never errors, even when every
    /// job failed.
    pub async fn join(&self) -> BatchSnapshot {
        let mut rx = self.snapshot_rx.clone();
        match rx.wait_for(BatchSnapshot::is_settled).await {
            Ok(snapshot) => snapshot.clone(),
            // The sender lives in `shared`, which we hold; this arm is a
            // fallback, not an expected path.
            Err(_) => self.snapshot_rx.borrow().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    use crate::domain::{FailureCause, GeneratedAsset, JobState};
    use crate::error::GenerateError;

    type Responder =
        Box<dyn Fn(&str, u32) -> Result<GeneratedAsset, GenerateError> + Send + Sync>;

    /// Scripted in-process client: records call times, tracks in-flight
    /// concurrency, and answers via a per-(prompt, nth-call) responder.
    struct FakeClient {
        calls: StdMutex<Vec<(String, Instant)>>,
        per_prompt: StdMutex<HashMap<String, u32>>,
        latencies: HashMap<String, Duration>,
        default_latency: Duration,
        responder: Responder,
        in_flight: AtomicUsize,
        max_in_flight_seen: AtomicUsize,
    }

    impl FakeClient {
        fn echo() -> Self {
            Self::with_responder(Box::new(|prompt, _| {
                Ok(GeneratedAsset::text("text/plain", format!("echo:{prompt}")))
            }))
        }

        fn with_responder(responder: Responder) -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                per_prompt: StdMutex::new(HashMap::new()),
                latencies: HashMap::new(),
                default_latency: Duration::ZERO,
                responder,
                in_flight: AtomicUsize::new(0),
                max_in_flight_seen: AtomicUsize::new(0),
            }
        }

        fn with_latency(mut self, prompt: &str, latency: Duration) -> Self {
            self.latencies.insert(prompt.to_string(), latency);
            self
        }

        fn with_default_latency(mut self, latency: Duration) -> Self {
            self.default_latency = latency;
            self
        }

        fn first_call_at(&self, prompt: &str) -> Option<Instant> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| p == prompt)
                .map(|(_, at)| *at)
        }
    }

    #[async_trait]
    impl GenerateClient for FakeClient {
        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> Result<GeneratedAsset, GenerateError> {
            let prompt = match request.parts.first() {
                Some(ContentPart::Text { text }) => text.clone(),
                _ => String::new(),
            };
            self.calls
                .lock()
                .unwrap()
                .push((prompt.clone(), Instant::now()));
            let nth = {
                let mut counts = self.per_prompt.lock().unwrap();
                let count = counts.entry(prompt.clone()).or_insert(0);
                *count += 1;
                *count
            };

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight_seen.fetch_max(current, Ordering::SeqCst);
            let latency = self
                .latencies
                .get(&prompt)
                .copied()
                .unwrap_or(self.default_latency);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            (self.responder)(&prompt, nth)
        }
    }

    fn config() -> BatchConfig {
        BatchConfig::new(ModelId::new("studio-test"))
    }

    fn shots(n: usize) -> Vec<JobDescriptor> {
        (0..n)
            .map(|i| JobDescriptor::new(format!("shot {i}"), format!("p{i}")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn one_failed_slot_never_aborts_the_batch() {
        let client = Arc::new(FakeClient::with_responder(Box::new(|prompt, _| {
            if prompt == "p2" {
                Err(GenerateError::upstream("Invalid request"))
            } else {
                Ok(GeneratedAsset::text("text/plain", format!("echo:{prompt}")))
            }
        })));
        let coordinator = BatchCoordinator::new(Arc::clone(&client), config());

        let handle = coordinator.submit(shots(4)).unwrap();
        let settled = handle.join().await;

        for index in [0, 1, 3] {
            assert!(
                matches!(settled.jobs[index].state, JobState::Succeeded { .. }),
                "job {index} should have succeeded"
            );
        }
        match &settled.jobs[2].state {
            JobState::Failed { error } => {
                assert_eq!(error.cause, FailureCause::Terminal);
                assert_eq!(error.message, "Invalid request");
            }
            other => panic!("job 2 should have failed, was {other:?}"),
        }
        assert_eq!(settled.counts().succeeded, 3);
        assert_eq!(settled.counts().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn results_land_in_submission_slots_regardless_of_completion_order() {
        // Job 0 is by far the slowest, so it finishes last.
        let client = Arc::new(
            FakeClient::echo()
                .with_latency("p0", Duration::from_secs(5))
                .with_default_latency(Duration::from_millis(10)),
        );
        let coordinator = BatchCoordinator::new(Arc::clone(&client), config());

        let handle = coordinator.submit(shots(4)).unwrap();
        let settled = handle.join().await;

        for index in 0..4 {
            let job = &settled.jobs[index];
            assert_eq!(job.index, index);
            assert_eq!(job.label, format!("shot {index}"));
            match &job.state {
                JobState::Succeeded { result } => {
                    assert_eq!(result.payload.as_text(), Some(format!("echo:p{index}").as_str()));
                }
                other => panic!("job {index} should have succeeded, was {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stagger_ramps_call_start_times() {
        let client = Arc::new(FakeClient::echo());
        let coordinator = BatchCoordinator::new(Arc::clone(&client), config());

        let started = Instant::now();
        let handle = coordinator.submit(shots(4)).unwrap();
        handle.join().await;

        for index in 0..4u32 {
            let called_at = client
                .first_call_at(&format!("p{index}"))
                .expect("every job should have called upstream");
            let earliest = started + Duration::from_millis(500) * index;
            assert!(
                called_at >= earliest,
                "job {index} called at {called_at:?}, before {earliest:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn per_slot_transitions_are_observable_before_the_batch_settles() {
        let client = Arc::new(FakeClient::echo().with_default_latency(Duration::from_secs(1)));
        let coordinator = BatchCoordinator::new(Arc::clone(&client), config());

        let handle = coordinator.submit(shots(4)).unwrap();
        assert_eq!(handle.counts().running, 4);

        let mut rx = handle.subscribe();
        let partial = rx
            .wait_for(|snap| snap.counts().succeeded >= 1)
            .await
            .unwrap()
            .clone();

        // Later slots are still ramping up while the first result streams in.
        assert!(partial.counts().running >= 1);
        assert!(!partial.is_settled());

        let settled = handle.join().await;
        assert_eq!(settled.counts().succeeded, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_settles_slots_that_have_not_called_upstream() {
        let client = Arc::new(FakeClient::echo().with_default_latency(Duration::from_secs(5)));
        let coordinator = BatchCoordinator::new(Arc::clone(&client), config());

        let handle = coordinator.submit(shots(3)).unwrap();

        // Cancel while job 0 is in flight and jobs 1..2 still sit in their
        // stagger wait.
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();

        let settled = handle.join().await;

        // An in-flight attempt runs to completion.
        assert!(matches!(settled.jobs[0].state, JobState::Succeeded { .. }));
        for index in [1, 2] {
            match &settled.jobs[index].state {
                JobState::Failed { error } => assert_eq!(error.cause, FailureCause::Cancelled),
                other => panic!("job {index} should be cancelled, was {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn max_in_flight_caps_simultaneous_calls() {
        let client = Arc::new(FakeClient::echo().with_default_latency(Duration::from_secs(1)));
        let mut cfg = config();
        cfg.stagger = Duration::ZERO;
        cfg.max_in_flight = Some(2);
        let coordinator = BatchCoordinator::new(Arc::clone(&client), cfg);

        let handle = coordinator.submit(shots(6)).unwrap();
        let settled = handle.join().await;

        assert_eq!(settled.counts().succeeded, 6);
        assert!(client.max_in_flight_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_and_attempts_recorded() {
        let client = Arc::new(FakeClient::with_responder(Box::new(|prompt, nth| {
            if nth < 3 {
                Err(GenerateError::upstream("Model overloaded"))
            } else {
                Ok(GeneratedAsset::text("text/plain", format!("echo:{prompt}")))
            }
        })));
        let coordinator = BatchCoordinator::new(Arc::clone(&client), config());

        let handle = coordinator.submit(shots(1)).unwrap();
        let settled = handle.join().await;

        assert!(matches!(settled.jobs[0].state, JobState::Succeeded { .. }));
        assert_eq!(settled.jobs[0].attempts, 3);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let coordinator = BatchCoordinator::new(Arc::new(FakeClient::echo()), config());
        assert_eq!(coordinator.submit(vec![]).unwrap_err(), BatchError::EmptyBatch);
    }

    #[tokio::test]
    async fn blank_label_is_rejected_with_its_index() {
        let coordinator = BatchCoordinator::new(Arc::new(FakeClient::echo()), config());
        let descriptors = vec![
            JobDescriptor::new("hero shot", "p0"),
            JobDescriptor::new("  ", "p1"),
        ];
        assert_eq!(
            coordinator.submit(descriptors).unwrap_err(),
            BatchError::EmptyLabel { index: 1 }
        );
    }
}
