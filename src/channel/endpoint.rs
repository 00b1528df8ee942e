/*!
 * Worker Endpoint
 * The client side of the channel: every send is a synchronous rendezvous
 * that blocks until the coordinator replies to this sender
 */

use super::types::{ChannelError, ChannelResult, Message, MessageKind, Reply, MAX_FRAME};
use crate::config::ResourcePaths;
use crate::core::Pid;
use log::debug;
use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

pub struct WorkerEndpoint {
    socket: UnixDatagram,
    server: PathBuf,
    local: PathBuf,
    pid: Pid,
}

impl WorkerEndpoint {
    /// Attach to the coordinator's channel. Workers only attach; they never
    /// create the well-known socket.
    pub fn attach(paths: &ResourcePaths, pid: Pid) -> ChannelResult<Self> {
        let server = paths.coordinator_socket();
        if !server.exists() {
            return Err(ChannelError::NotFound(server.display().to_string()));
        }

        let local = paths.worker_socket(pid);
        let socket = match UnixDatagram::bind(&local) {
            Ok(socket) => socket,
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                return Err(ChannelError::AlreadyExists(local.display().to_string()))
            }
            Err(e) => return Err(ChannelError::Transport(e.to_string())),
        };

        debug!("worker {pid}: channel attached at {}", local.display());
        Ok(Self {
            socket,
            server,
            local,
            pid,
        })
    }

    /// Send one message and block until the reply addressed to this pid
    /// arrives. The blocking recv is the rendezvous: a deferred sender sits
    /// here until the coordinator's filter widens enough to service it.
    pub fn send(&self, kind: MessageKind) -> ChannelResult<Reply> {
        let frame = bincode::serialize(&Message {
            kind,
            from: self.pid,
        })
        .map_err(|e| ChannelError::Malformed(e.to_string()))?;
        self.socket
            .send_to(&frame, &self.server)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let mut buf = [0u8; MAX_FRAME];
        loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    return bincode::deserialize::<Reply>(&buf[..n])
                        .map_err(|e| ChannelError::Malformed(e.to_string()))
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::Transport(e.to_string())),
            }
        }
    }
}

impl Drop for WorkerEndpoint {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.local);
    }
}
