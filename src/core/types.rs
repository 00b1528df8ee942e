/*!
 * Core Types
 */

/// Process ID type. OS pids for spawned workers, synthetic ids for
/// substituted spawn targets. Zero never names a live worker.
pub type Pid = u32;
