/*!
 * Worker Executor
 * OS-level spawning, signaling, and reaping of worker processes
 */

use crate::config::{ResourcePaths, ENV_NAMESPACE, ENV_RUNTIME_DIR};
use crate::core::Pid;
use log::{info, warn};
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use thiserror::Error;

/// Spawn operation result
pub type SpawnResult<T> = Result<T, SpawnError>;

/// Spawn errors
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("worker not found: {0}")]
    NotFound(Pid),
}

/// How a reaped worker exited. The trace records the two distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Normal(i32),
    Signaled(i32),
}

/// Spawn-target abstraction. The worker executable is an opaque,
/// substitutable collaborator; tests back it with threads.
pub trait Spawn {
    fn spawn(&mut self) -> SpawnResult<Pid>;

    /// Non-blocking exit check; `Ok(None)` while still running.
    fn try_reap(&mut self, pid: Pid) -> SpawnResult<Option<ExitKind>>;

    /// Ask a worker to stop (best effort).
    fn request_stop(&mut self, pid: Pid);

    /// Force-kill a worker that ignored the stop request.
    fn force_kill(&mut self, pid: Pid);
}

/// Spawns the worker executable with no arguments; the shared-resource
/// identities travel through the environment.
pub struct WorkerExecutor {
    command: PathBuf,
    paths: ResourcePaths,
    children: HashMap<Pid, Child>,
}

impl WorkerExecutor {
    pub fn new(command: PathBuf, paths: ResourcePaths) -> Self {
        Self {
            command,
            paths,
            children: HashMap::new(),
        }
    }
}

impl Spawn for WorkerExecutor {
    fn spawn(&mut self) -> SpawnResult<Pid> {
        let child = Command::new(&self.command)
            .env(ENV_RUNTIME_DIR, self.paths.runtime_dir())
            .env(ENV_NAMESPACE, self.paths.namespace())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| SpawnError::SpawnFailed(format!("{}: {}", self.command.display(), e)))?;

        let pid = child.id();
        info!("spawned worker process {pid}");
        self.children.insert(pid, child);
        Ok(pid)
    }

    fn try_reap(&mut self, pid: Pid) -> SpawnResult<Option<ExitKind>> {
        let child = self
            .children
            .get_mut(&pid)
            .ok_or(SpawnError::NotFound(pid))?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.children.remove(&pid);
                let kind = match status.code() {
                    Some(code) => ExitKind::Normal(code),
                    None => ExitKind::Signaled(status.signal().unwrap_or(0)),
                };
                Ok(Some(kind))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(SpawnError::SpawnFailed(e.to_string())),
        }
    }

    fn request_stop(&mut self, pid: Pid) {
        use nix::sys::signal::{kill, Signal};
        if let Err(e) = kill(nix::unistd::Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("SIGTERM to worker {pid} failed: {e}");
        }
    }

    fn force_kill(&mut self, pid: Pid) {
        if let Some(child) = self.children.get_mut(&pid) {
            if let Err(e) = child.kill() {
                warn!("SIGKILL to worker {pid} failed: {e}");
            }
        }
    }
}
