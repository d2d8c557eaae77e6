use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use log::{debug, warn};
use tokio::runtime::Handle;

/// Runs an action once, `delay` after the first of a burst of triggers.
///
/// Triggers received while a run is pending are dropped. The action itself runs on the blocking
/// pool so it may do bus calls.
#[derive(Clone)]
pub struct Debouncer {
    runtime: Handle,
    delay: Duration,
    pending: Arc<AtomicBool>,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl Debouncer {
    pub fn new<F>(runtime: Handle, delay: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Debouncer {
            runtime,
            delay,
            pending: Arc::new(AtomicBool::new(false)),
            action: Arc::new(action),
        }
    }

    /// Returns `true` if this call scheduled a run.
    pub fn trigger(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            debug!("Refresh already pending");
            return false;
        }

        let pending = self.pending.clone();
        let action = self.action.clone();
        let delay = self.delay;

        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // cleared first, a trigger during the run schedules the next one
            pending.store(false, Ordering::Release);

            if let Err(error) = tokio::task::spawn_blocking(move || action()).await {
                warn!("Debounced action failed: {error:?}");
            }
        });

        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn test_coalesce_and_rearm() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let debouncer = Debouncer::new(Handle::current(), Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.trigger());
        assert!(!debouncer.trigger());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(debouncer.trigger());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
