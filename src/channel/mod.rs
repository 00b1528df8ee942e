/*!
 * Channel Module
 * Addressed rendezvous messaging and the arbitration filter that turns it
 * into a mutual-exclusion protocol
 */

pub mod endpoint;
pub mod filter;
pub mod server;
pub mod types;

// Re-export public API
pub use endpoint::WorkerEndpoint;
pub use filter::AcceptFilter;
pub use server::ChannelServer;
pub use types::{ChannelError, ChannelResult, Message, MessageKind, Reply};
