/*!
 * Configuration
 * Runtime settings and the well-known identities of the shared resources
 */

use crate::core::Pid;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WORKERS: u32 = 5;
pub const DEFAULT_MAX_RUNTIME_SECS: u32 = 20;
pub const DEFAULT_LOG_PATH: &str = "log.txt";
pub const DEFAULT_WORKER_COMMAND: &str = "./worker";
pub const DEFAULT_NAMESPACE: &str = "ossim";
pub const DEFAULT_POOL_CAPACITY: usize = 100;
pub const DEFAULT_QUANTUM_NS: u64 = 100;
pub const DEFAULT_CEILING_SECS: u64 = 2;
pub const DEFAULT_UNLOCK_WAIT: Duration = Duration::from_secs(5);

/// Environment variables handed to spawned workers so the spawn target
/// stays argument-free.
pub const ENV_RUNTIME_DIR: &str = "OSSIM_RUNTIME_DIR";
pub const ENV_NAMESPACE: &str = "OSSIM_NAMESPACE";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("pool capacity must be at least 1")]
    ZeroCapacity,

    #[error("tick quantum must be non-zero")]
    ZeroQuantum,

    #[error("virtual time ceiling must be non-zero")]
    ZeroCeiling,
}

/// Coordinator run settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Initial/steady worker pool size
    pub workers: u32,
    /// Wall-clock runtime limit in seconds before forced shutdown
    pub max_runtime_secs: u32,
    /// Trace destination
    pub log_path: PathBuf,
    /// Worker executable to spawn
    pub worker_command: PathBuf,
    /// Directory holding the shared resource identities
    pub runtime_dir: PathBuf,
    /// Identity namespace for the shared clock and the message channel
    pub namespace: String,
    /// Hard cap on total spawns across a run
    pub pool_capacity: usize,
    /// Nanoseconds the virtual clock advances per coordinator tick
    pub quantum_ns: u64,
    /// Virtual-time ceiling in seconds
    pub ceiling_secs: u64,
    /// Bounded wall-clock wait for UNLOCK from the current lock holder
    pub unlock_wait: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_runtime_secs: DEFAULT_MAX_RUNTIME_SECS,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            worker_command: PathBuf::from(DEFAULT_WORKER_COMMAND),
            runtime_dir: std::env::temp_dir(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            quantum_ns: DEFAULT_QUANTUM_NS,
            ceiling_secs: DEFAULT_CEILING_SECS,
            unlock_wait: DEFAULT_UNLOCK_WAIT,
        }
    }
}

impl Settings {
    /// Reject configurations that cannot produce a meaningful run. A worker
    /// count above the pool capacity is not an error; priming clamps it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.pool_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.quantum_ns == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if self.ceiling_secs == 0 {
            return Err(ConfigError::ZeroCeiling);
        }
        Ok(())
    }

    pub fn paths(&self) -> ResourcePaths {
        ResourcePaths::new(self.runtime_dir.clone(), self.namespace.clone())
    }
}

/// Well-known filesystem identities for the shared clock region and the
/// message channel sockets. Independently started workers locate both
/// through these paths alone.
#[derive(Debug, Clone)]
pub struct ResourcePaths {
    dir: PathBuf,
    namespace: String,
}

impl ResourcePaths {
    pub fn new(dir: PathBuf, namespace: String) -> Self {
        Self { dir, namespace }
    }

    /// Identities as seen by a spawned worker: environment overrides from
    /// the coordinator, defaults otherwise.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(ENV_RUNTIME_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let namespace = std::env::var(ENV_NAMESPACE)
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        Self { dir, namespace }
    }

    pub fn runtime_dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Backing file of the shared clock region
    pub fn clock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.clock", self.namespace))
    }

    /// The coordinator's receive socket
    pub fn coordinator_socket(&self) -> PathBuf {
        self.dir.join(format!("{}.sock", self.namespace))
    }

    /// A worker's reply socket, addressed by its pid
    pub fn worker_socket(&self, pid: Pid) -> PathBuf {
        self.dir.join(format!("{}.{}.sock", self.namespace, pid))
    }
}
