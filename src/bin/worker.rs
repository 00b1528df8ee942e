/*!
 * worker - The Opaque Spawn Target
 * Attaches to the coordinator's shared resources, races for the claim slot,
 * announces termination
 */

use log::{debug, error};
use ossim::config::ResourcePaths;
use ossim::worker::WorkerTask;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let pid = std::process::id();
    let paths = ResourcePaths::from_env();

    let task = match WorkerTask::start(&paths, pid) {
        Ok(task) => task,
        Err(e) => {
            error!("worker {pid}: attach failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Seeded from the pid, as each worker must draw its own deadline.
    let mut rng = StdRng::seed_from_u64(pid as u64);
    match task.run(&mut rng) {
        Ok(done) => {
            debug!(
                "worker {pid}: claimed at {} (deadline {})",
                done.claimed_at, done.deadline
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            // A channel failure aborts without TERM; the coordinator's
            // liveness guard recovers the filter.
            error!("worker {pid}: aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
