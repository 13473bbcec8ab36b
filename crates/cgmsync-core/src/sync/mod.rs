//! Sync cycles and the periodic driver.

pub mod error;
pub mod orchestrator;

pub use error::SyncError;
pub use orchestrator::{CycleOutcome, SyncHandle, SyncOrchestrator};
