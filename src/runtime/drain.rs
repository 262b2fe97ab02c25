//! Per-worker drain state.
//!
//! `Active -> Draining -> Terminated`. Once draining, new requests are
//! refused with 503 while in-flight ones run to completion; a deadline armed
//! at the transition bounds how long that may take.

use std::{future::Future, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::warn;

/// Hard limit between the termination signal and process exit.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Active,
    Draining,
    Terminated,
}

#[derive(Clone, Debug)]
pub struct DrainController {
    state: Arc<watch::Sender<WorkerState>>,
}

impl Default for DrainController {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WorkerState::Active);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// True once the worker has stopped taking new requests.
    pub fn is_draining(&self) -> bool {
        self.state() != WorkerState::Active
    }

    /// Returns `true` only for the call that performed the transition.
    pub fn begin_drain(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == WorkerState::Active {
                *state = WorkerState::Draining;
                true
            } else {
                false
            }
        })
    }

    pub fn mark_terminated(&self) {
        self.state.send_replace(WorkerState::Terminated);
    }

    /// Resolves when draining starts. Suitable as a graceful shutdown trigger.
    pub fn draining(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            // the sender lives as long as any controller clone, including ours
            let _ = rx.wait_for(|state| *state != WorkerState::Active).await;
        }
    }
}

/// Run `on_expire` after `grace` unless the returned task is aborted first.
pub fn arm_deadline<F>(grace: Duration, on_expire: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(grace_secs = grace.as_secs(), "drain deadline reached, exiting");
        on_expire();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn transitions_once() {
        let drain = DrainController::new();
        assert_eq!(drain.state(), WorkerState::Active);
        assert!(!drain.is_draining());

        assert!(drain.begin_drain());
        assert!(!drain.begin_drain());
        assert_eq!(drain.state(), WorkerState::Draining);
        assert!(drain.is_draining());

        drain.mark_terminated();
        assert_eq!(drain.state(), WorkerState::Terminated);
        assert!(drain.is_draining());
        assert!(!drain.begin_drain());
    }

    #[test]
    fn clones_share_state() {
        let drain = DrainController::new();
        let other = drain.clone();
        other.begin_drain();
        assert!(drain.is_draining());
    }

    #[tokio::test]
    async fn draining_future_resolves_on_transition() {
        let drain = DrainController::new();
        let waiter = tokio::spawn(drain.draining());
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drain.begin_drain();
        waiter.await.unwrap();

        // already draining: resolves immediately
        drain.draining().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_after_grace() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = arm_deadline(DRAIN_DEADLINE, move || flag.store(true, Ordering::SeqCst));

        tokio::time::sleep(DRAIN_DEADLINE - Duration::from_secs(1)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_deadline_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = arm_deadline(DRAIN_DEADLINE, move || flag.store(true, Ordering::SeqCst));

        handle.abort();
        tokio::time::sleep(DRAIN_DEADLINE * 2).await;
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!fired.load(Ordering::SeqCst));
    }
}
