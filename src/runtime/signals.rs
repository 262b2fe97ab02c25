//! Termination signal handling shared by the supervisor and its workers.
//!
//! SIGINT, SIGTERM and SIGQUIT are all treated as "shut down gracefully".

use anyhow::{Context, Result};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl TerminationSignal {
    pub fn name(self) -> &'static str {
        match self {
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Quit => "SIGQUIT",
        }
    }

    #[cfg(unix)]
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            TerminationSignal::Interrupt => Signal::SIGINT,
            TerminationSignal::Terminate => Signal::SIGTERM,
            TerminationSignal::Quit => Signal::SIGQUIT,
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Installed signal listeners. Create once and keep for the process lifetime
/// so no signal is missed between two `recv` calls.
#[cfg(unix)]
pub struct TerminationSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("installing SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("installing SIGTERM handler")?,
            quit: signal(SignalKind::quit()).context("installing SIGQUIT handler")?,
        })
    }

    /// Wait for the next termination signal.
    pub async fn recv(&mut self) -> TerminationSignal {
        tokio::select! {
            _ = self.interrupt.recv() => TerminationSignal::Interrupt,
            _ = self.terminate.recv() => TerminationSignal::Terminate,
            _ = self.quit.recv() => TerminationSignal::Quit,
        }
    }
}

#[cfg(not(unix))]
pub struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    pub fn install() -> Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> TerminationSignal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => TerminationSignal::Interrupt,
            Err(err) => {
                tracing::error!(%err, "Ctrl+C handler failed");
                std::future::pending().await
            }
        }
    }
}
