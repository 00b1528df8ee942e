/*!
 * Process Lifecycle Manager
 * The coordinator's spawn/replenish/reap/shutdown state machine, and the
 * dispatch loop whose strict sequentiality supplies mutual exclusion
 */

use super::executor::{ExitKind, Spawn};
use super::slots::SlotTable;
use crate::channel::{AcceptFilter, ChannelError, ChannelServer, Message, MessageKind};
use crate::clock::{ClockError, ClockStore, TickOutcome};
use crate::config::Settings;
use crate::core::Pid;
use crate::trace::Trace;
use log::{error, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Cadence for re-checking the stop flag while no message is pending.
const IDLE_POLL: Duration = Duration::from_millis(250);
/// Cadence and bound for the shutdown reap loop.
const REAP_POLL: Duration = Duration::from_millis(100);
const REAP_ATTEMPTS: u32 = 50;
/// Wall-clock pacing per tick, keeping the dispatch loop off a busy spin.
const TICK_PACING: Duration = Duration::from_micros(10);

/// Coordinator operation result
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Coordinator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("trace file: {0}")]
    Trace(#[from] std::io::Error),
}

/// Lifecycle states. `ShuttingDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Priming,
    Running,
    Draining,
    ShuttingDown,
}

/// Why a run ended. Every variant funnels through the same shutdown path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Virtual time passed the configured ceiling
    CeilingReached,
    /// The pool capacity was spent and every worker was reaped
    PoolDrained,
    /// An asynchronous stop flag (signal or wall-clock timeout) was seen
    Interrupted,
    /// The coordinator's own channel endpoint failed
    TransportFailure,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::CeilingReached => write!(f, "virtual time ceiling reached"),
            StopReason::PoolDrained => write!(f, "pool drained"),
            StopReason::Interrupted => write!(f, "termination requested"),
            StopReason::TransportFailure => write!(f, "channel transport failure"),
        }
    }
}

/// The coordinator context: explicit owner of every shared resource and of
/// all lifecycle state. Single-threaded and strictly sequential; servicing
/// one message at a time is what makes the LOCK/UNLOCK bracket exclusive.
pub struct Coordinator<S: Spawn> {
    settings: Settings,
    clock: ClockStore,
    channel: ChannelServer,
    slots: SlotTable,
    spawner: S,
    trace: Trace,
    filter: AcceptFilter,
    holder: Option<Pid>,
    narrowed_at: Option<Instant>,
    state: RunState,
    stop: &'static AtomicBool,
}

impl<S: Spawn> Coordinator<S> {
    /// Acquire every shared resource, in order: trace file, clock region,
    /// channel socket. Any failure here is fatal before a single worker
    /// exists; already-acquired resources are released by their own drops.
    pub fn init(
        settings: Settings,
        spawner: S,
        stop: &'static AtomicBool,
    ) -> CoordinatorResult<Self> {
        let paths = settings.paths();
        let trace = Trace::create(&settings.log_path)?;
        let clock = ClockStore::create(&paths)?;
        let channel = ChannelServer::create(&paths)?;
        let slots = SlotTable::new(settings.pool_capacity);
        Ok(Self {
            settings,
            clock,
            channel,
            slots,
            spawner,
            trace,
            filter: AcceptFilter::Any,
            holder: None,
            narrowed_at: None,
            state: RunState::Priming,
            stop,
        })
    }

    /// Drive a full run: prime the pool, dispatch until a stop condition,
    /// shut down. Every termination trigger exits through `shutdown`.
    pub fn run(&mut self) -> CoordinatorResult<StopReason> {
        self.prime();
        let reason = self.run_loop();
        self.shutdown(reason)?;
        Ok(reason)
    }

    /// Spawn the initial pool, clamped to capacity. Spawn failures are
    /// logged and the run proceeds understaffed.
    fn prime(&mut self) {
        let target = (self.settings.workers as usize).min(self.slots.capacity());
        info!("priming pool with {target} workers");
        for _ in 0..target {
            self.spawn_worker();
        }
        self.state = RunState::Running;
    }

    fn spawn_worker(&mut self) {
        match self.spawner.spawn() {
            Ok(pid) => {
                if self.slots.register(pid).is_err() {
                    warn!("spawned worker {pid} over capacity, stopping it");
                    self.spawner.request_stop(pid);
                    return;
                }
                self.trace
                    .record(self.clock.now(), format_args!("spawned worker {pid}"));
            }
            Err(e) => {
                warn!("worker spawn failed: {e}");
                self.trace
                    .record(self.clock.now(), format_args!("{e}"));
            }
        }
    }

    fn run_loop(&mut self) -> StopReason {
        loop {
            // Asynchronous triggers only set the flag; the transition
            // happens here, at the loop boundary, never mid-exchange.
            if self.stop.load(Ordering::SeqCst) {
                return StopReason::Interrupted;
            }
            if self.state == RunState::Draining && self.slots.live_count() == 0 {
                return StopReason::PoolDrained;
            }

            let wait = match self.narrowed_at {
                Some(since) => self
                    .settings
                    .unlock_wait
                    .saturating_sub(since.elapsed())
                    .min(IDLE_POLL),
                None => IDLE_POLL,
            };

            match self.channel.receive(self.filter, Some(wait)) {
                Ok(msg) => {
                    // Rendezvous: the reply is what unblocks the sender.
                    if let Err(e) = self.channel.reply(msg.from) {
                        warn!("reply to worker {} failed: {e}", msg.from);
                        self.trace.record(
                            self.clock.now(),
                            format_args!("worker {} unreachable", msg.from),
                        );
                        self.reap_exited();
                        continue;
                    }
                    self.dispatch(msg);
                }
                Err(ChannelError::Timeout) => {
                    if let Some(since) = self.narrowed_at {
                        if since.elapsed() >= self.settings.unlock_wait {
                            self.recover_stalled_holder();
                        }
                    }
                    // Catch workers that died without a TERM.
                    self.reap_exited();
                    continue;
                }
                Err(e) => {
                    error!("channel receive failed: {e}");
                    return StopReason::TransportFailure;
                }
            }

            // One quantum per serviced exchange.
            match self
                .clock
                .tick(self.settings.quantum_ns, self.settings.ceiling_secs)
            {
                TickOutcome::CeilingReached => {
                    self.trace.record(
                        self.clock.now(),
                        format_args!(
                            "reached {} seconds of virtual time",
                            self.settings.ceiling_secs
                        ),
                    );
                    return StopReason::CeilingReached;
                }
                TickOutcome::Continue => {
                    self.trace.record(
                        self.clock.now(),
                        format_args!("advanced clock by {} ns", self.settings.quantum_ns),
                    );
                }
            }
            std::thread::sleep(TICK_PACING);
        }
    }

    fn dispatch(&mut self, msg: Message) {
        let now = self.clock.now();
        match msg.kind {
            MessageKind::Lock => {
                self.filter = AcceptFilter::Exactly(MessageKind::Unlock);
                self.holder = Some(msg.from);
                self.narrowed_at = Some(Instant::now());
                self.trace
                    .record(now, format_args!("LOCK granted to worker {}", msg.from));
            }
            MessageKind::Unlock => {
                self.filter = AcceptFilter::Any;
                self.holder = None;
                self.narrowed_at = None;
                self.trace
                    .record(now, format_args!("UNLOCK from worker {}", msg.from));
            }
            MessageKind::Term => {
                self.trace
                    .record(now, format_args!("TERM from worker {}", msg.from));
                // Free the claim slot for the remaining racers.
                self.clock.clear_claim_of(msg.from);
                self.reap_exited();
                if self.state == RunState::Running {
                    if self.slots.is_exhausted() {
                        self.state = RunState::Draining;
                        self.trace.record(
                            now,
                            format_args!(
                                "pool capacity {} spent, draining",
                                self.slots.capacity()
                            ),
                        );
                    } else {
                        self.spawn_worker();
                    }
                }
            }
        }
    }

    /// Non-blocking status poll over every tracked worker, recording normal
    /// and signaled exits distinctly.
    fn reap_exited(&mut self) {
        let live: Vec<Pid> = self.slots.live().collect();
        for pid in live {
            match self.spawner.try_reap(pid) {
                Ok(Some(kind)) => {
                    self.slots.mark_dead(pid);
                    self.channel.discard_worker(pid);
                    let now = self.clock.now();
                    match kind {
                        ExitKind::Normal(code) => self.trace.record(
                            now,
                            format_args!("reaped worker {pid}, exit code {code}"),
                        ),
                        ExitKind::Signaled(sig) => self.trace.record(
                            now,
                            format_args!("reaped worker {pid}, killed by signal {sig}"),
                        ),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("reap of worker {pid} failed: {e}");
                    self.slots.mark_dead(pid);
                    self.channel.discard_worker(pid);
                }
            }
        }
    }

    /// Liveness guard: the lock holder never sent UNLOCK within the bound.
    /// Revert the filter so the rest of the pool stops starving, drop the
    /// stalled worker's claim, and push it toward the reaper.
    fn recover_stalled_holder(&mut self) {
        let now = self.clock.now();
        if let Some(pid) = self.holder.take() {
            warn!(
                "worker {pid} sent no UNLOCK within {:?}, reclaiming the section",
                self.settings.unlock_wait
            );
            self.trace.record(
                now,
                format_args!("worker {pid} stalled holding the lock, filter reverted"),
            );
            self.clock.clear_claim_of(pid);
            self.spawner.request_stop(pid);
        }
        self.filter = AcceptFilter::Any;
        self.narrowed_at = None;
    }

    /// The single funnel for every termination trigger: stop all workers,
    /// reap them, release the channel and the clock, flush the trace.
    fn shutdown(&mut self, reason: StopReason) -> CoordinatorResult<()> {
        self.state = RunState::ShuttingDown;
        info!("shutting down: {reason}");
        self.trace
            .record(self.clock.now(), format_args!("shutting down: {reason}"));

        for pid in self.slots.live().collect::<Vec<_>>() {
            self.spawner.request_stop(pid);
        }

        let mut attempts = 0;
        while self.slots.live_count() > 0 && attempts < REAP_ATTEMPTS {
            self.reap_exited();
            if self.slots.live_count() == 0 {
                break;
            }
            std::thread::sleep(REAP_POLL);
            attempts += 1;
        }

        let stragglers: Vec<Pid> = self.slots.live().collect();
        for pid in &stragglers {
            warn!("worker {pid} ignored the stop request, force killing");
            self.spawner.force_kill(*pid);
        }
        if !stragglers.is_empty() {
            for _ in 0..10 {
                self.reap_exited();
                if self.slots.live_count() == 0 {
                    break;
                }
                std::thread::sleep(REAP_POLL);
            }
        }

        // Force-killed workers never ran their drops; sweep every reply
        // socket the run created before releasing the channel.
        for pid in self.slots.all().collect::<Vec<_>>() {
            self.channel.discard_worker(pid);
        }

        let at = self.clock.now();
        self.channel.release();
        self.clock.release()?;
        self.trace.record(at, format_args!("coordinator exit"));
        self.trace.flush()?;
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn total_spawned(&self) -> usize {
        self.slots.total_spawned()
    }

    pub fn live_workers(&self) -> usize {
        self.slots.live_count()
    }
}
