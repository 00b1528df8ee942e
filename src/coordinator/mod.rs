/*!
 * Coordinator Module
 * The process-lifecycle state machine and its spawn/reap machinery
 */

pub mod executor;
pub mod lifecycle;
pub mod slots;

// Re-export public API
pub use executor::{ExitKind, Spawn, SpawnError, SpawnResult, WorkerExecutor};
pub use lifecycle::{Coordinator, CoordinatorError, RunState, StopReason};
pub use slots::{SlotTable, WorkerSlot};
