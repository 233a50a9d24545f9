//! The page the executor acts on.

pub mod simulated;
pub mod snapshot;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{CaptureError, StepExecutionError};
use crate::plan::Instruction;

pub use snapshot::Snapshot;

/// Target the executor drives. Failures come back as values; nothing here
/// panics across the boundary.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Identifier of the page being driven (usually its URL), or `None` when
    /// there is nothing to act on.
    async fn active_target(&self) -> Option<String>;

    async fn capture(&self) -> Result<Snapshot, CaptureError>;

    /// Performs one validated instruction and returns its result payload.
    async fn perform(&self, instruction: &Instruction) -> Result<Value, StepExecutionError>;
}
