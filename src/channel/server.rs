/*!
 * Channel Server
 * The coordinator's side of the channel: sole consumer, selective dispatch.
 * Messages that do not match the current filter are deferred unserviced,
 * which leaves their senders blocked inside their own `send`.
 */

use super::filter::AcceptFilter;
use super::types::{ChannelError, ChannelResult, Message, Reply, MAX_FRAME};
use crate::config::ResourcePaths;
use crate::core::Pid;
use log::{debug, warn};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub struct ChannelServer {
    socket: UnixDatagram,
    path: PathBuf,
    paths: ResourcePaths,
    deferred: VecDeque<Message>,
    pid: Pid,
    released: bool,
}

impl ChannelServer {
    /// Bind the well-known coordinator socket. Fails rather than reusing a
    /// stale identity left behind by a prior abnormal run.
    pub fn create(paths: &ResourcePaths) -> ChannelResult<Self> {
        let path = paths.coordinator_socket();
        let socket = match UnixDatagram::bind(&path) {
            Ok(socket) => socket,
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                return Err(ChannelError::AlreadyExists(path.display().to_string()))
            }
            Err(e) => return Err(ChannelError::Transport(e.to_string())),
        };
        debug!("channel server bound at {}", path.display());
        Ok(Self {
            socket,
            path,
            paths: paths.clone(),
            deferred: VecDeque::new(),
            pid: std::process::id(),
            released: false,
        })
    }

    /// Service the oldest pending message matching `filter`. Deferred
    /// messages are scanned first, in arrival order; fresh arrivals that do
    /// not match are queued without extending the timeout. `None` blocks
    /// indefinitely.
    pub fn receive(
        &mut self,
        filter: AcceptFilter,
        timeout: Option<Duration>,
    ) -> ChannelResult<Message> {
        if let Some(pos) = self.deferred.iter().position(|m| filter.matches(m.kind)) {
            if let Some(msg) = self.deferred.remove(pos) {
                return Ok(msg);
            }
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut buf = [0u8; MAX_FRAME];
        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ChannelError::Timeout);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.socket
                .set_read_timeout(wait)
                .map_err(|e| ChannelError::Transport(e.to_string()))?;

            let n = match self.socket.recv(&mut buf) {
                Ok(n) => n,
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    return Err(ChannelError::Timeout)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::Transport(e.to_string())),
            };

            let msg: Message = match bincode::deserialize(&buf[..n]) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("dropping malformed channel frame: {e}");
                    continue;
                }
            };
            if filter.matches(msg.kind) {
                return Ok(msg);
            }
            self.deferred.push_back(msg);
        }
    }

    /// Unblock exactly the sender addressed `to`. A vanished reply socket is
    /// a dead worker, not a dead run; the caller decides what that means.
    pub fn reply(&self, to: Pid) -> ChannelResult<()> {
        let frame = bincode::serialize(&Reply { from: self.pid })
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;
        let dest = self.paths.worker_socket(to);
        self.socket
            .send_to(&frame, &dest)
            .map_err(|e| ChannelError::Transport(format!("reply to {to}: {e}")))?;
        Ok(())
    }

    /// Remove a dead worker's reply socket. Workers unlink their own socket
    /// on a clean exit, but a signal-terminated worker never runs its drops,
    /// so the coordinator sweeps the identity when it reaps the worker;
    /// otherwise a later worker reusing the pid cannot attach.
    pub fn discard_worker(&self, pid: Pid) {
        let path = self.paths.worker_socket(pid);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("swept reply socket of worker {pid}"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("reply socket removal for worker {pid} failed: {e}"),
        }
    }

    /// Number of deferred, unserviced messages.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Remove the well-known socket. Idempotent; every shutdown path may
    /// call it.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("channel socket removal failed: {e}");
            }
        }
    }
}

impl Drop for ChannelServer {
    fn drop(&mut self) {
        self.release();
    }
}
