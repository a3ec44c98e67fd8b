use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Cooperative cancellation flag polled by animated steps at every
/// suspension point.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new token and the trigger that cancels it.
    pub fn new() -> (Self, CancellationTrigger) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = watch::channel(false);

        let token = Self {
            cancelled: Arc::clone(&cancelled),
            notify: rx,
        };
        let trigger = CancellationTrigger {
            cancelled,
            notify: tx,
        };
        (token, trigger)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// trigger is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.notify.clone();
        loop {
            if self.is_cancelled() || *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                if self.is_cancelled() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Handle that cancels every clone of its token.
#[derive(Debug)]
pub struct CancellationTrigger {
    cancelled: Arc<AtomicBool>,
    notify: watch::Sender<bool>,
}

impl CancellationTrigger {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
