//! Cooperative cancellation primitives.
//!
//! A `CancelSource` flips the flag; any number of cloned `CancelToken`s
//! observe it. Built on `tokio::sync::watch` so waiters wake promptly.

use tokio::sync::watch;

/// Owner side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

/// Observer side of a cancellation pair. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a linked source/token pair.
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

impl CancelSource {
    /// Flip the flag. All tokens observe it at their next check.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Mint another token linked to this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    /// A token that can never fire. Useful for one-shot callers.
    pub fn noop() -> Self {
        static NOOP: std::sync::OnceLock<(watch::Sender<bool>, watch::Receiver<bool>)> =
            std::sync::OnceLock::new();
        let (_, rx) = NOOP.get_or_init(|| watch::channel(false));
        CancelToken { rx: rx.clone() }
    }

    /// Non-blocking check, used at stage boundaries.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag flips. Never resolves if the source is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
