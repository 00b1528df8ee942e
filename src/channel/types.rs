/*!
 * Channel Types
 * Wire messages and channel errors
 */

use crate::core::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound on an encoded frame; messages are a kind tag plus a pid.
pub const MAX_FRAME: usize = 64;

/// Channel operation result
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    /// A socket under the same identity survives from a prior run.
    #[error("channel endpoint already exists: {0}")]
    AlreadyExists(String),

    #[error("channel endpoint not found: {0}")]
    NotFound(String),

    #[error("channel transport failure: {0}")]
    Transport(String),

    #[error("malformed channel frame: {0}")]
    Malformed(String),

    /// No matching message arrived within the bounded wait.
    #[error("timed out waiting for a matching message")]
    Timeout,
}

/// The kinds a worker may send. `ANY` is not a message kind; it lives on the
/// receive side as [`super::AcceptFilter::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Request the critical section
    Lock,
    /// Leave the critical section
    Unlock,
    /// Announce termination
    Term,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Lock => write!(f, "LOCK"),
            MessageKind::Unlock => write!(f, "UNLOCK"),
            MessageKind::Term => write!(f, "TERM"),
        }
    }
}

/// One ephemeral exchange request; consumed exactly once by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub from: Pid,
}

/// The coordinator's answer; unblocks exactly the addressed sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub from: Pid,
}
