/*!
 * Shared Clock Store
 * A memory-mapped clock region shared between the coordinator and every worker
 */

use super::types::{ClockError, ClockResult, TickOutcome, VirtualTime, NS_PER_SEC};
use crate::config::ResourcePaths;
use crate::core::Pid;
use log::debug;
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::mem::size_of;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const CLOCK_MAGIC: u32 = 0x4f53_5343; // "OSSC"
const STATE_READY: u32 = 2;

/// On-region layout. All access goes through atomics; `seconds`/`nanos` have
/// a single writer (the coordinator's tick), `claim` is written only inside
/// a LOCK/UNLOCK bracket. `claim == 0` means no holder.
#[repr(C, align(64))]
struct ClockBlock {
    magic: AtomicU32,
    init_state: AtomicU32,
    seconds: AtomicU64,
    nanos: AtomicU64,
    claim: AtomicU32,
}

/// Handle to the shared clock region. The coordinator creates and destroys
/// the region; workers only attach.
pub struct ClockStore {
    _map: MmapMut,
    ptr: *const ClockBlock,
    path: PathBuf,
    owned: bool,
}

// The mapped block is only ever accessed through its atomics.
unsafe impl Send for ClockStore {}
unsafe impl Sync for ClockStore {}

impl ClockStore {
    /// Allocate a fresh region under the well-known identity. Coordinator-only.
    pub fn create(paths: &ResourcePaths) -> ClockResult<Self> {
        let path = paths.clock_path();
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ClockError::AlreadyExists(path.display().to_string()))
            }
            Err(e) => return Err(ClockError::AllocationFailed(e.to_string())),
        };
        file.set_len(size_of::<ClockBlock>() as u64)
            .map_err(|e| ClockError::AllocationFailed(e.to_string()))?;
        let mut map = unsafe {
            MmapOptions::new()
                .len(size_of::<ClockBlock>())
                .map_mut(&file)
        }
        .map_err(|e| ClockError::AllocationFailed(e.to_string()))?;
        map.fill(0);

        let ptr = map.as_ptr() as *const ClockBlock;
        let block = unsafe { &*ptr };
        block.magic.store(CLOCK_MAGIC, Ordering::Relaxed);
        block.init_state.store(STATE_READY, Ordering::Release);

        debug!("clock region created at {}", path.display());
        Ok(Self {
            _map: map,
            ptr,
            path,
            owned: true,
        })
    }

    /// Attach to an existing region. Worker side; never creates.
    pub fn attach(paths: &ResourcePaths) -> ClockResult<Self> {
        let path = paths.clock_path();
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ClockError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(ClockError::AllocationFailed(e.to_string())),
        };
        let len = file
            .metadata()
            .map_err(|e| ClockError::AllocationFailed(e.to_string()))?
            .len() as usize;
        if len < size_of::<ClockBlock>() {
            return Err(ClockError::Corrupt("clock region too small"));
        }
        let map = unsafe {
            MmapOptions::new()
                .len(size_of::<ClockBlock>())
                .map_mut(&file)
        }
        .map_err(|e| ClockError::AllocationFailed(e.to_string()))?;

        let ptr = map.as_ptr() as *const ClockBlock;
        let block = unsafe { &*ptr };
        if block.init_state.load(Ordering::Acquire) != STATE_READY {
            return Err(ClockError::Corrupt("clock region not initialized"));
        }
        if block.magic.load(Ordering::Acquire) != CLOCK_MAGIC {
            return Err(ClockError::Corrupt("clock region magic mismatch"));
        }

        Ok(Self {
            _map: map,
            ptr,
            path,
            owned: false,
        })
    }

    fn block(&self) -> &ClockBlock {
        unsafe { &*self.ptr }
    }

    /// Current virtual time. Readable by any participant at any time; the
    /// two fields are read independently, which the protocol tolerates.
    pub fn now(&self) -> VirtualTime {
        let block = self.block();
        VirtualTime::new(
            block.seconds.load(Ordering::Acquire),
            block.nanos.load(Ordering::Acquire) as u32,
        )
    }

    /// Advance the clock by one quantum. Coordinator-only; the single-writer
    /// discipline makes plain load/store pairs sufficient.
    pub fn tick(&self, quantum_ns: u64, ceiling_secs: u64) -> TickOutcome {
        let block = self.block();
        let mut nanos = block.nanos.load(Ordering::Acquire) + quantum_ns;
        if nanos >= NS_PER_SEC {
            let mut secs = block.seconds.load(Ordering::Acquire);
            // A quantum may span several seconds; carry until the nanos
            // invariant holds again.
            while nanos >= NS_PER_SEC {
                nanos -= NS_PER_SEC;
                secs += 1;
            }
            block.nanos.store(nanos, Ordering::Release);
            block.seconds.store(secs, Ordering::Release);
            if secs > ceiling_secs {
                return TickOutcome::CeilingReached;
            }
        } else {
            block.nanos.store(nanos, Ordering::Release);
        }
        TickOutcome::Continue
    }

    /// Current claim holder, if any.
    pub fn claim_holder(&self) -> Option<Pid> {
        match self.block().claim.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Record `pid` as the claim holder. Called only inside the caller's
    /// LOCK/UNLOCK bracket; exclusivity comes from the arbitration protocol,
    /// not from this store.
    pub fn set_claim(&self, pid: Pid) {
        self.block().claim.store(pid, Ordering::Release);
    }

    /// Clear the claim if `pid` holds it; a no-op otherwise.
    pub fn clear_claim_of(&self, pid: Pid) {
        let _ = self
            .block()
            .claim
            .compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Destroy the backing region. Coordinator-only; idempotent so every
    /// shutdown path may call it.
    pub fn release(&mut self) -> ClockResult<()> {
        if !self.owned {
            return Ok(());
        }
        self.owned = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("clock region released at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClockError::ReleaseFailed(e.to_string())),
        }
    }
}

impl Drop for ClockStore {
    fn drop(&mut self) {
        if self.owned {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
