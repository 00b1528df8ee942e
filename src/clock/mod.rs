/*!
 * Clock Module
 * The shared virtual clock region and its time arithmetic
 */

pub mod store;
pub mod types;

// Re-export public API
pub use store::ClockStore;
pub use types::{ClockError, ClockResult, TickOutcome, VirtualTime, NS_PER_SEC};
