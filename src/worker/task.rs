/*!
 * Worker Task
 * Acquire exclusion, compute a randomized deadline, race for the shared
 * claim slot, announce termination
 */

use crate::channel::{ChannelError, MessageKind, WorkerEndpoint};
use crate::clock::{ClockError, ClockStore, VirtualTime};
use crate::config::ResourcePaths;
use crate::core::Pid;
use log::debug;
use rand::Rng;
use thiserror::Error;

/// Upper bound of the uniform deadline draw, in virtual nanoseconds.
pub const DEADLINE_SPREAD_NS: u64 = 99_999;

/// Worker operation result
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker errors. A channel failure mid-protocol aborts the task without
/// sending TERM; the coordinator's liveness guard recovers the filter.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// What a finished worker observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The absolute virtual-time deadline it raced toward
    pub deadline: VirtualTime,
    /// The virtual time at which it took the claim
    pub claimed_at: VirtualTime,
}

/// One worker's view of the shared system.
///
/// State machine: START -> AWAIT_LOCK -> COMPUTE_DEADLINE -> RELEASE ->
/// POLL -> CLAIMED -> TERMINATED. Aborts exit the machine from any state.
pub struct WorkerTask {
    pid: Pid,
    clock: ClockStore,
    channel: WorkerEndpoint,
}

impl WorkerTask {
    /// START: attach to the shared clock region and the message channel.
    /// Attaches only; creation and destruction belong to the coordinator.
    pub fn start(paths: &ResourcePaths, pid: Pid) -> WorkerResult<Self> {
        let clock = ClockStore::attach(paths)?;
        let channel = WorkerEndpoint::attach(paths, pid)?;
        Ok(Self { pid, clock, channel })
    }

    /// Drive the task to completion.
    pub fn run<R: Rng>(self, rng: &mut R) -> WorkerResult<Completion> {
        let deadline = self.compute_deadline(rng)?;
        debug!("worker {}: racing for the claim until {}", self.pid, deadline);

        let claimed_at = self.poll_claim(deadline)?;
        debug!("worker {}: claimed at {}", self.pid, claimed_at);

        // Sent outside any bracket, by convention; the coordinator only
        // services TERM while its filter is wide open.
        self.channel.send(MessageKind::Term)?;
        Ok(Completion {
            deadline,
            claimed_at,
        })
    }

    /// Read the clock and fix an absolute deadline, inside one bracket.
    fn compute_deadline<R: Rng>(&self, rng: &mut R) -> WorkerResult<VirtualTime> {
        self.channel.send(MessageKind::Lock)?;
        let start = self.clock.now();
        let span = rng.gen_range(1..=DEADLINE_SPREAD_NS);
        self.channel.send(MessageKind::Unlock)?;
        Ok(start.add_nanos(span))
    }

    /// POLL: re-enter the critical section until the deadline has passed
    /// and the slot is free. The check-and-set happens entirely inside one
    /// LOCK/UNLOCK bracket, which is what makes the claim single-winner.
    fn poll_claim(&self, deadline: VirtualTime) -> WorkerResult<VirtualTime> {
        loop {
            self.channel.send(MessageKind::Lock)?;
            let now = self.clock.now();
            let claimed = now >= deadline && self.clock.claim_holder().is_none();
            if claimed {
                self.clock.set_claim(self.pid);
            }
            self.channel.send(MessageKind::Unlock)?;
            if claimed {
                return Ok(now);
            }
        }
    }
}
