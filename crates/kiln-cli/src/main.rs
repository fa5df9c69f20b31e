use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiln_core::batch::{BatchConfig, BatchCoordinator};
use kiln_core::domain::{GeneratedAsset, JobDescriptor, JobState};
use kiln_core::error::GenerateError;
use kiln_core::generate::{
    ApiKey, ContentPart, CredentialPool, GenerateClient, GenerateRequest, ModelId,
    SelectionStrategy,
};

/// In-process stand-in for the remote generation endpoint.
///
/// The first few calls fail with a transient-looking message so the retry
/// path is visible; prompts asking for a watermark are rejected terminally
/// so one slot demonstrates failure isolation.
struct DemoClient {
    pool: CredentialPool,
    remaining_outages: AtomicU32,
}

impl DemoClient {
    fn new(pool: CredentialPool, outages: u32) -> Self {
        Self {
            pool,
            remaining_outages: AtomicU32::new(outages),
        }
    }
}

#[async_trait]
impl GenerateClient for DemoClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedAsset, GenerateError> {
        let key = self.pool.next();
        tracing::debug!(key = ?key, model = %request.model, "calling generation endpoint");
        tokio::time::sleep(Duration::from_millis(300)).await;

        let left = self.remaining_outages.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_outages.fetch_sub(1, Ordering::Relaxed);
            return Err(GenerateError::upstream("503 Service Unavailable"));
        }

        let prompt = match request.parts.first() {
            Some(ContentPart::Text { text }) => text.as_str(),
            _ => "",
        };
        if prompt.contains("watermark") {
            return Err(GenerateError::upstream("Invalid request: watermarks are not supported"));
        }

        Ok(GeneratedAsset::text("text/plain", format!("[render of: {prompt}]")))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_core=info,kiln_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = CredentialPool::new(
        vec![ApiKey::new("demo-key-a"), ApiKey::new("demo-key-b")],
        SelectionStrategy::RoundRobin,
    )
    .expect("demo key list is non-empty");
    let client = Arc::new(DemoClient::new(pool, 2));

    let mut config = BatchConfig::new(ModelId::new("studio-image-1"));
    config.generation.system_instruction =
        Some("Render a clean e-commerce product shot.".to_string());
    // Snappier backoff than the production default, to keep the demo short.
    config.backoff.base_delay = Duration::from_millis(250);
    let coordinator = BatchCoordinator::new(client, config);

    let shots = vec![
        JobDescriptor::new("Hero shot", "the sneaker on a white cube, studio light"),
        JobDescriptor::new("Lifestyle", "the sneaker worn on a rainy city street"),
        JobDescriptor::new("Flat lay", "the sneaker among travel gear, top-down"),
        JobDescriptor::new("Detail", "macro of the stitching with a watermark"),
    ];
    let total = shots.len();

    let handle = coordinator.submit(shots).expect("demo descriptors are valid");
    println!("submitted {} with {total} shots", handle.batch_id());

    // Stream per-slot transitions as they land; the batch keeps going even
    // when a slot fails.
    let mut rx = handle.subscribe();
    let mut reported = vec![false; total];
    loop {
        let snapshot = rx.borrow_and_update().clone();
        for job in &snapshot.jobs {
            if job.state.is_terminal() && !reported[job.index] {
                reported[job.index] = true;
                match &job.state {
                    JobState::Succeeded { result } => println!(
                        "  [{}] done after {} attempt(s): {}",
                        job.label,
                        job.attempts,
                        result.payload.as_text().unwrap_or("<binary asset>"),
                    ),
                    JobState::Failed { error } => println!(
                        "  [{}] failed ({:?}): {}",
                        job.label, error.cause, error.message
                    ),
                    _ => {}
                }
            }
        }
        if snapshot.is_settled() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }

    let counts = handle.counts();
    println!(
        "batch settled: {} succeeded, {} failed",
        counts.succeeded, counts.failed
    );
}
