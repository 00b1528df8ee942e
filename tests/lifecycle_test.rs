/*!
 * Lifecycle Tests
 * Full coordinator runs against thread-backed spawn targets
 */

use ossim::channel::{ChannelError, MessageKind, WorkerEndpoint};
use ossim::clock::{ClockError, ClockStore};
use ossim::config::{ResourcePaths, Settings};
use ossim::coordinator::{Coordinator, ExitKind, Spawn, SpawnError, SpawnResult, StopReason};
use ossim::core::Pid;
use ossim::worker::{Completion, WorkerTask};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serial_test::serial;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn paths_in(dir: &tempfile::TempDir, ns: &str) -> ResourcePaths {
    ResourcePaths::new(PathBuf::from(dir.path()), ns.to_string())
}

fn settings_in(dir: &tempfile::TempDir, ns: &str) -> Settings {
    Settings {
        runtime_dir: PathBuf::from(dir.path()),
        namespace: ns.to_string(),
        log_path: dir.path().join("trace.txt"),
        ..Settings::default()
    }
}

fn leaked_flag(initial: bool) -> &'static AtomicBool {
    Box::leak(Box::new(AtomicBool::new(initial)))
}

/// Substituted spawn target: each "process" is a thread running the real
/// worker task against the real shared resources.
struct ThreadSpawner {
    paths: ResourcePaths,
    next_pid: Pid,
    handles: HashMap<Pid, JoinHandle<()>>,
    completions: Arc<Mutex<Vec<(Pid, Completion)>>>,
    /// The first spawn acquires the lock and then dies inside the bracket,
    /// modeling a transport failure before UNLOCK.
    stall_first: bool,
    spawned: u32,
}

impl ThreadSpawner {
    fn new(
        paths: ResourcePaths,
        completions: Arc<Mutex<Vec<(Pid, Completion)>>>,
        stall_first: bool,
    ) -> Self {
        Self {
            paths,
            next_pid: 10_000,
            handles: HashMap::new(),
            completions,
            stall_first,
            spawned: 0,
        }
    }
}

impl Spawn for ThreadSpawner {
    fn spawn(&mut self) -> SpawnResult<Pid> {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.spawned += 1;
        let paths = self.paths.clone();
        let completions = Arc::clone(&self.completions);
        let stall = self.stall_first && self.spawned == 1;

        let handle = thread::spawn(move || {
            if stall {
                let endpoint = WorkerEndpoint::attach(&paths, pid).unwrap();
                // Granted the section, then gone without UNLOCK. Killed
                // processes run no drops, so the reply socket stays behind.
                let _ = endpoint.send(MessageKind::Lock);
                std::mem::forget(endpoint);
                return;
            }
            let task = match WorkerTask::start(&paths, pid) {
                Ok(task) => task,
                Err(_) => return,
            };
            let mut rng = StdRng::seed_from_u64(pid as u64);
            if let Ok(done) = task.run(&mut rng) {
                completions.lock().unwrap().push((pid, done));
            }
        });
        self.handles.insert(pid, handle);
        Ok(pid)
    }

    fn try_reap(&mut self, pid: Pid) -> SpawnResult<Option<ExitKind>> {
        match self.handles.get(&pid) {
            Some(handle) if handle.is_finished() => {
                let handle = self.handles.remove(&pid).expect("handle present");
                match handle.join() {
                    Ok(()) => Ok(Some(ExitKind::Normal(0))),
                    Err(_) => Ok(Some(ExitKind::Signaled(6))),
                }
            }
            Some(_) => Ok(None),
            None => Err(SpawnError::NotFound(pid)),
        }
    }

    fn request_stop(&mut self, _pid: Pid) {}

    fn force_kill(&mut self, _pid: Pid) {}
}

/// Always-failing spawn target, for the understaffed-run paths.
struct FailingSpawner;

impl Spawn for FailingSpawner {
    fn spawn(&mut self) -> SpawnResult<Pid> {
        Err(SpawnError::SpawnFailed("resource exhausted".to_string()))
    }

    fn try_reap(&mut self, pid: Pid) -> SpawnResult<Option<ExitKind>> {
        Err(SpawnError::NotFound(pid))
    }

    fn request_stop(&mut self, _pid: Pid) {}

    fn force_kill(&mut self, _pid: Pid) {}
}

/// Priming 3 with capacity 3 and deterministic deadline draws: exactly three
/// TERMs, exactly three spawns, drain, and both shared identities destroyed.
#[test]
#[serial]
fn scenario_pool_drains_after_capacity_is_spent() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths_in(&dir, "run-drain");
    let mut settings = settings_in(&dir, "run-drain");
    settings.workers = 3;
    settings.pool_capacity = 3;

    let completions = Arc::new(Mutex::new(Vec::new()));
    let spawner = ThreadSpawner::new(paths.clone(), Arc::clone(&completions), false);
    let mut coordinator =
        Coordinator::init(settings.clone(), spawner, leaked_flag(false)).unwrap();

    let reason = coordinator.run().unwrap();
    assert_eq!(reason, StopReason::PoolDrained);
    assert_eq!(coordinator.total_spawned(), 3);
    assert_eq!(coordinator.live_workers(), 0);

    // Exactly one worker at a time ever took the claim, strictly inside a
    // bracket, and each observed its own deadline as passed.
    let done = completions.lock().unwrap();
    assert_eq!(done.len(), 3);
    for (_, completion) in done.iter() {
        assert!(completion.claimed_at >= completion.deadline);
    }

    // Claims were serialized, never granted to two workers at once: the
    // slot frees only when the holder's TERM is dispatched, and the clock
    // ticks on every serviced exchange in between, so the three claim
    // times must be strictly ordered.
    let mut claim_times: Vec<_> = done.iter().map(|(_, c)| c.claimed_at).collect();
    claim_times.sort();
    for pair in claim_times.windows(2) {
        assert!(
            pair[0] < pair[1],
            "concurrent claims at {} and {}",
            pair[0],
            pair[1]
        );
    }

    // Post-shutdown attaches fail: both identities were destroyed.
    assert!(matches!(
        ClockStore::attach(&paths),
        Err(ClockError::NotFound(_))
    ));
    assert!(matches!(
        WorkerEndpoint::attach(&paths, 9_999),
        Err(ChannelError::NotFound(_))
    ));

    let trace = std::fs::read_to_string(&settings.log_path).unwrap();
    assert_eq!(trace.matches("spawned worker").count(), 3);
    assert_eq!(trace.matches("TERM from worker").count(), 3);
    assert!(trace.contains("pool capacity 3 spent, draining"));
    let last = trace.lines().last().unwrap();
    assert!(last.contains("coordinator exit"), "unexpected final line: {last}");
}

/// A worker that dies holding the lock must not starve the rest of the
/// pool; the coordinator reverts its filter within the configured bound.
#[test]
#[serial]
fn stalled_lock_holder_does_not_starve_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths_in(&dir, "run-stall");
    let mut settings = settings_in(&dir, "run-stall");
    settings.workers = 2;
    settings.pool_capacity = 2;
    settings.unlock_wait = Duration::from_millis(300);

    let completions = Arc::new(Mutex::new(Vec::new()));
    let spawner = ThreadSpawner::new(paths.clone(), Arc::clone(&completions), true);
    let mut coordinator =
        Coordinator::init(settings.clone(), spawner, leaked_flag(false)).unwrap();

    let reason = coordinator.run().unwrap();
    assert_eq!(reason, StopReason::PoolDrained);
    assert_eq!(coordinator.total_spawned(), 2);

    // Only the healthy worker completed the protocol.
    assert_eq!(completions.lock().unwrap().len(), 1);

    let trace = std::fs::read_to_string(&settings.log_path).unwrap();
    assert!(trace.contains("stalled holding the lock"));

    // The staller ran no drops; the coordinator swept its reply socket.
    assert!(!paths.worker_socket(10_000).exists());
}

/// An asynchronous stop request is consumed at the loop boundary and still
/// exits through the full shutdown funnel; spawn failures leave the run
/// understaffed, never dead.
#[test]
#[serial]
fn interrupted_run_exits_through_the_shutdown_funnel() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths_in(&dir, "run-stop");
    let mut settings = settings_in(&dir, "run-stop");
    settings.workers = 2;

    let mut coordinator =
        Coordinator::init(settings.clone(), FailingSpawner, leaked_flag(true)).unwrap();

    let reason = coordinator.run().unwrap();
    assert_eq!(reason, StopReason::Interrupted);
    assert_eq!(coordinator.total_spawned(), 0);

    assert!(matches!(
        ClockStore::attach(&paths),
        Err(ClockError::NotFound(_))
    ));

    let trace = std::fs::read_to_string(&settings.log_path).unwrap();
    assert_eq!(trace.matches("spawn failed").count(), 2);
    assert!(trace.contains("shutting down: termination requested"));
    assert!(trace.lines().last().unwrap().contains("coordinator exit"));
}

/// Initialization must refuse a stale clock identity instead of reusing it.
#[test]
#[serial]
fn init_refuses_stale_resources() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths_in(&dir, "run-stale");
    let settings = settings_in(&dir, "run-stale");

    let stale = ClockStore::create(&paths).unwrap();
    std::mem::forget(stale);

    let err = Coordinator::init(settings, FailingSpawner, leaked_flag(false))
        .err()
        .expect("init must fail on a stale identity");
    assert!(err.to_string().contains("already exists"));
}
