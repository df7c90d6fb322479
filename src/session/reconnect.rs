//! One-at-a-time reconnect scheduling.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Limits fire-and-forget reconnects to one in flight per device.
#[derive(Debug, Default)]
pub struct ReconnectSlot {
    busy: Arc<AtomicBool>,
}

impl ReconnectSlot {
    /// Creates an idle slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a reconnect task is running.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Spawns `task` unless one is already running.
    ///
    /// Returns true if the task was spawned. The slot is released when the
    /// task finishes, even if it panics.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let release = Release(Arc::clone(&self.busy));
        tokio::spawn(async move {
            let _release = release;
            task.await;
        });
        true
    }
}

struct Release(Arc<AtomicBool>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
