use std::time::Duration;

use tokio::sync::watch;

/// How a deferred transition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    Elapsed,
    Cancelled,
}

/// A one-shot delay that can be called off before it fires.
#[derive(Debug)]
pub struct DeferredTransition {
    cancelled: watch::Sender<bool>,
}

impl Default for DeferredTransition {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredTransition {
    #[must_use]
    pub fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self { cancelled }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Wait out `delay` unless cancelled first.
    pub async fn wait(&self, delay: Duration) -> Fired {
        let mut rx = self.cancelled.subscribe();
        if *rx.borrow_and_update() {
            return Fired::Cancelled;
        }
        if delay.is_zero() {
            return Fired::Elapsed;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                if self.is_cancelled() { Fired::Cancelled } else { Fired::Elapsed }
            }
            _ = rx.wait_for(|cancelled| *cancelled) => Fired::Cancelled,
        }
    }
}
