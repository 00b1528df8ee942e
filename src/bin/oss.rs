/*!
 * oss - Coordinator Entry Point
 * Parses options, installs signal flags, and drives a full run
 */

use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use log::{error, info};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::alarm;
use ossim::config::{self, Settings};
use ossim::coordinator::{Coordinator, StopReason, WorkerExecutor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

/// Simulated OS scheduler: supervises a bounded pool of worker processes
/// racing for a shared claim slot under message-arbitrated mutual exclusion.
#[derive(Parser, Debug)]
#[command(name = "oss", version, about)]
struct Cli {
    /// Initial/steady worker pool size
    #[arg(short = 'c', long = "workers", default_value_t = config::DEFAULT_WORKERS)]
    workers: u32,

    /// Wall-clock runtime limit in seconds before forced shutdown
    #[arg(short = 't', long = "max-runtime", default_value_t = config::DEFAULT_MAX_RUNTIME_SECS)]
    max_runtime: u32,

    /// Trace destination
    #[arg(short = 'l', long = "log", default_value = config::DEFAULT_LOG_PATH)]
    log: PathBuf,

    /// Worker executable to spawn
    #[arg(long = "worker-cmd", default_value = config::DEFAULT_WORKER_COMMAND)]
    worker_cmd: PathBuf,

    /// Identity namespace for the shared clock and message channel
    #[arg(long, default_value = config::DEFAULT_NAMESPACE)]
    namespace: String,
}

static STOP: AtomicBool = AtomicBool::new(false);

// Handlers only set the flag; the coordinator consumes it at the next loop
// boundary, never mid-exchange.
extern "C" fn on_signal(_sig: i32) {
    STOP.store(true, Ordering::SeqCst);
}

fn install_signal_flags() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGTERM, &action)?;
        signal::sigaction(Signal::SIGINT, &action)?;
        signal::sigaction(Signal::SIGALRM, &action)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    // --help and --version exit before any resource is acquired.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e)
            if matches!(
                e.kind(),
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion
            ) =>
        {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let settings = Settings {
        workers: cli.workers,
        max_runtime_secs: cli.max_runtime,
        log_path: cli.log,
        worker_command: cli.worker_cmd,
        namespace: cli.namespace,
        ..Settings::default()
    };
    if let Err(e) = settings.validate() {
        eprintln!("oss: invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = install_signal_flags() {
        eprintln!("oss: installing signal handlers failed: {e}");
        return ExitCode::FAILURE;
    }
    let _ = alarm::set(settings.max_runtime_secs);

    let executor = WorkerExecutor::new(settings.worker_command.clone(), settings.paths());
    let mut coordinator = match Coordinator::init(settings, executor, &STOP) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("initialization failed: {e}");
            eprintln!("oss: {e}");
            return ExitCode::FAILURE;
        }
    };

    match coordinator.run() {
        Ok(StopReason::TransportFailure) => {
            error!("run ended on transport failure");
            ExitCode::FAILURE
        }
        Ok(reason) => {
            info!("run complete: {reason}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("shutdown failed: {e}");
            ExitCode::FAILURE
        }
    }
}
