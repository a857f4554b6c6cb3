// src/utils/cancel.rs

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Notify, task::JoinHandle};

#[derive(Debug, Default)]
struct Signal {
    tripped: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation signal shared between a caller and a long pass.
///
/// Can be polled with `is_cancelled` or awaited with `cancelled`, so a pass
/// blocked on a slow read still sees the trip.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<Signal>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.tripped.store(true, Ordering::Release);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.tripped.load(Ordering::Acquire)
    }

    /// Resolves once the flag is tripped.
    pub async fn cancelled(&self) {
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a trip in between is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Drives `fut` to completion unless the flag trips first.
    /// Returns `None` when cancelled, including when already tripped.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = fut => Some(output),
        }
    }

    /// Returns a flag that trips itself after `timeout`.
    /// Dropping the guard disarms the timer.
    pub fn with_deadline(timeout: Duration) -> (Self, DeadlineGuard) {
        let flag = Self::new();
        let trip = flag.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!("Deadline of {:?} reached, cancelling", timeout);
            trip.cancel();
        });
        (flag, DeadlineGuard(timer))
    }
}

/// Aborts the deadline timer when dropped.
#[derive(Debug)]
pub struct DeadlineGuard(JoinHandle<()>);

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
