/*!
 * Worker Module
 * The client state machine run by each spawned worker
 */

pub mod task;

// Re-export public API
pub use task::{Completion, WorkerError, WorkerResult, WorkerTask, DEADLINE_SPREAD_NS};
