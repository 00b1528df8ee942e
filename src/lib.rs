/*!
 * ossim
 * Simulated OS process scheduling: a coordinator supervises a bounded pool
 * of worker processes that share a virtual clock and race for a single
 * claim slot under message-arbitrated mutual exclusion
 */

pub mod channel;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod trace;
pub mod worker;

// Re-exports
pub use channel::{AcceptFilter, ChannelServer, Message, MessageKind, WorkerEndpoint};
pub use clock::{ClockStore, TickOutcome, VirtualTime};
pub use config::{ResourcePaths, Settings};
pub use coordinator::{Coordinator, StopReason, WorkerExecutor};
pub use trace::Trace;
pub use worker::WorkerTask;
