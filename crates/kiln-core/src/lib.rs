//! kiln-core
//!
//! Core building blocks for batched AI content generation:
//! - **domain**: IDs, assets, job descriptors and the per-slot state machine
//! - **retry**: transient classification, backoff policy, retrying invoker
//! - **generate**: the generation-client port and credential pool
//! - **batch**: the fan-out coordinator and the upstream scene planner
//! - **cancel**: shared cooperative cancellation flag
//!
//! The crate owns no transport: [`generate::GenerateClient`] is the seam
//! where an HTTP implementation (or an in-process double) plugs in.

pub mod batch;
pub mod cancel;
pub mod domain;
pub mod error;
pub mod generate;
pub mod retry;
