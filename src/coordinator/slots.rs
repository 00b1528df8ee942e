/*!
 * Worker Slots
 * Bounded bookkeeping for every worker spawned across a run
 */

use crate::core::Pid;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("worker pool capacity {0} exhausted")]
pub struct PoolExhausted(pub usize);

/// One spawned worker. Slots are never removed; `alive` flips on reap, so
/// the table doubles as the total-spawn count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub pid: Pid,
    pub alive: bool,
}

/// Ordered collection of worker slots, bounded by the pool capacity.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<WorkerSlot>,
    capacity: usize,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn register(&mut self, pid: Pid) -> Result<(), PoolExhausted> {
        if self.slots.len() >= self.capacity {
            return Err(PoolExhausted(self.capacity));
        }
        self.slots.push(WorkerSlot { pid, alive: true });
        Ok(())
    }

    /// Clear a reaped worker's slot. Returns false for unknown or already
    /// dead pids.
    pub fn mark_dead(&mut self, pid: Pid) -> bool {
        match self.slots.iter_mut().find(|s| s.pid == pid && s.alive) {
            Some(slot) => {
                slot.alive = false;
                true
            }
            None => false,
        }
    }

    /// Every pid ever registered, reaped ones included.
    pub fn all(&self) -> impl Iterator<Item = Pid> + '_ {
        self.slots.iter().map(|s| s.pid)
    }

    pub fn live(&self) -> impl Iterator<Item = Pid> + '_ {
        self.slots.iter().filter(|s| s.alive).map(|s| s.pid)
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.alive).count()
    }

    /// Total spawns across the run, reaped workers included.
    pub fn total_spawned(&self) -> usize {
        self.slots.len()
    }

    /// True once the capacity has been spent; no further spawns may happen.
    pub fn is_exhausted(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
