//! Worker supervisor.
//!
//! Re-executes the current binary once per worker slot with
//! [`WORKER_SLOT_ENV`] set, restarts workers that crash and forwards
//! termination signals. It never handles requests itself.

use crate::runtime::signals::{TerminationSignal, TerminationSignals};
use anyhow::{Context, Result};
use std::{ffi::OsString, io, path::PathBuf, process::ExitStatus};
use tokio::{
    process::{Child, Command},
    sync::watch,
    task::JoinSet,
};
use tracing::{error, info, warn};

/// Marks a process as a worker and carries its slot number.
pub const WORKER_SLOT_ENV: &str = "IMAGE_GATEWAY_WORKER";

/// Slot number if this process was started by a supervisor.
pub fn worker_slot_from_env() -> Option<usize> {
    std::env::var(WORKER_SLOT_ENV).ok()?.parse().ok()
}

/// Crashed workers are replaced; clean exits and anything during shutdown are not.
pub fn should_restart(status: &io::Result<ExitStatus>, shutting_down: bool) -> bool {
    if shutting_down {
        return false;
    }
    !matches!(status, Ok(status) if status.success())
}

struct WorkerExit {
    slot: usize,
    pid: Option<u32>,
    status: io::Result<ExitStatus>,
}

pub struct Supervisor {
    workers: usize,
    program: PathBuf,
    args: Vec<OsString>,
}

impl Supervisor {
    pub fn new(workers: usize, program: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            workers,
            program,
            args,
        }
    }

    /// Supervise copies of the running executable with the same arguments.
    pub fn for_current_exe(workers: usize) -> Result<Self> {
        let program = std::env::current_exe().context("locating current executable")?;
        Ok(Self::new(workers, program, std::env::args_os().skip(1).collect()))
    }

    /// Run until every worker has exited.
    pub async fn run(self) -> Result<()> {
        let mut signals = TerminationSignals::install()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(None::<TerminationSignal>);
        let mut pool = JoinSet::new();
        let mut shutting_down = false;

        for slot in 0..self.workers {
            self.spawn_worker(&mut pool, slot, shutdown_rx.clone())?;
        }

        loop {
            tokio::select! {
                signal = signals.recv(), if !shutting_down => {
                    info!(%signal, "server being shut down");
                    shutting_down = true;
                    shutdown_tx.send_replace(Some(signal));
                }
                joined = pool.join_next() => {
                    let Some(joined) = joined else { break };
                    let exit = match joined {
                        Ok(exit) => exit,
                        Err(err) => {
                            error!(error = %err, "worker monitor task failed");
                            continue;
                        }
                    };
                    log_exit(&exit);
                    if should_restart(&exit.status, shutting_down) {
                        if let Err(err) = self.spawn_worker(&mut pool, exit.slot, shutdown_rx.clone()) {
                            error!(slot = exit.slot, error = %err, "failed to restart worker");
                        }
                    }
                }
            }
        }

        info!("all workers exited");
        Ok(())
    }

    fn spawn_worker(
        &self,
        pool: &mut JoinSet<WorkerExit>,
        slot: usize,
        shutdown: watch::Receiver<Option<TerminationSignal>>,
    ) -> Result<()> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_SLOT_ENV, slot.to_string())
            .spawn()
            .with_context(|| format!("spawning worker {}", slot))?;
        info!(slot, pid = child.id(), "worker spawned");
        pool.spawn(monitor_worker(child, slot, shutdown));
        Ok(())
    }
}

/// Wait for a worker to exit, relaying the shutdown signal to it.
async fn monitor_worker(
    mut child: Child,
    slot: usize,
    mut shutdown: watch::Receiver<Option<TerminationSignal>>,
) -> WorkerExit {
    let pid = child.id();
    loop {
        tokio::select! {
            status = child.wait() => return WorkerExit { slot, pid, status },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    let status = child.wait().await;
                    return WorkerExit { slot, pid, status };
                }
                let signal = *shutdown.borrow_and_update();
                if let Some(signal) = signal {
                    forward_signal(&mut child, signal);
                }
            }
        }
    }
}

#[cfg(unix)]
fn forward_signal(child: &mut Child, signal: TerminationSignal) {
    use nix::{sys::signal::kill, unistd::Pid};

    let Some(pid) = child.id() else { return };
    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range, cannot forward signal");
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), signal.as_nix()) {
        warn!(pid, %signal, error = %err, "failed to forward signal to worker");
    }
}

#[cfg(not(unix))]
fn forward_signal(child: &mut Child, signal: TerminationSignal) {
    if let Err(err) = child.start_kill() {
        warn!(pid = child.id(), %signal, error = %err, "failed to stop worker");
    }
}

fn log_exit(exit: &WorkerExit) {
    match &exit.status {
        Ok(status) if status.success() => {
            info!(slot = exit.slot, pid = exit.pid, "worker shutdown");
        }
        Ok(status) => {
            warn!(slot = exit.slot, pid = exit.pid, %status, "worker died");
        }
        Err(err) => {
            error!(slot = exit.slot, pid = exit.pid, error = %err, "lost track of worker");
        }
    }
}
