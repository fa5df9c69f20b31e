//! Upstream planning call: ask the model for a scene list, get descriptors.
//!
//! Some batches are not a fixed catalog of shots; a storyboard's scene list
//! is decided by one planning call before the fan-out. The planner issues
//! that call through the same retry layer, then parses the JSON reply into
//! validated [`JobDescriptor`]s. A reply that cannot be parsed is a terminal
//! failure, never retried.

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::JobDescriptor;
use crate::error::GenerateError;
use crate::generate::{
    ContentPart, GenerateClient, GenerateRequest, GenerationConfig, ModelId, ResponseFormat,
};
use crate::retry::RetryingInvoker;

/// Shape the planning model is asked to reply with.
#[derive(Debug, Deserialize)]
struct PlannedScene {
    label: String,
    prompt: String,
}

/// Turns a product brief into a list of per-scene job descriptors.
pub struct ScenePlanner<C: ?Sized> {
    client: Arc<C>,
    invoker: RetryingInvoker,
    model: ModelId,
}

impl<C: GenerateClient + ?Sized> ScenePlanner<C> {
    pub fn new(client: Arc<C>, model: ModelId) -> Self {
        Self {
            client,
            invoker: RetryingInvoker::default(),
            model,
        }
    }

    /// Use a caller-owned invoker (shared cancellation, custom budget).
    pub fn with_invoker(mut self, invoker: RetryingInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// One planning call asking for `scene_count` scenes; returns the
    /// descriptors the model actually produced.
    pub async fn plan(
        &self,
        brief: &str,
        scene_count: usize,
    ) -> Result<Vec<JobDescriptor>, GenerateError> {
        let instruction = format!(
            "Plan {scene_count} storyboard scenes for the product brief. \
             Reply with a JSON array of objects carrying `label` and `prompt` fields."
        );
        let request = GenerateRequest::new(self.model.clone())
            .with_part(ContentPart::text(brief.to_owned()))
            .with_config(GenerationConfig {
                system_instruction: Some(instruction),
                response_format: Some(ResponseFormat::Json),
                ..GenerationConfig::default()
            });

        let client = Arc::clone(&self.client);
        let asset = self
            .invoker
            .invoke(move || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.generate(request).await }
            })
            .await?;

        let Some(text) = asset.payload.as_text() else {
            return Err(GenerateError::malformed("planner returned a binary payload"));
        };
        let scenes: Vec<PlannedScene> =
            serde_json::from_str(text).map_err(|e| GenerateError::malformed(e.to_string()))?;
        if scenes.is_empty() {
            return Err(GenerateError::malformed("planner returned no scenes"));
        }

        scenes
            .into_iter()
            .map(|scene| {
                if scene.label.trim().is_empty() {
                    return Err(GenerateError::malformed("planner scene has an empty label"));
                }
                Ok(JobDescriptor::new(scene.label, scene.prompt))
            })
            .collect()
    }
}
