//! Batch layer: fan-out coordination and upstream planning.

pub mod coordinator;
pub mod planner;

pub use coordinator::{BatchConfig, BatchCoordinator, BatchHandle};
pub use planner::ScenePlanner;
