//! Domain model (IDs, assets, jobs, batch views).

pub mod asset;
pub mod batch;
pub mod ids;
pub mod job;

pub use asset::{AssetPayload, GeneratedAsset, InputAsset};
pub use batch::{BatchCounts, BatchSnapshot};
pub use ids::{BatchId, JobId};
pub use job::{FailureCause, JobDescriptor, JobFailure, JobRecord, JobSnapshot, JobState};
