//! Cooperative cancellation shared by every long-running component.
//!
//! A watch channel carries a single flag from the binary entry point to
//! every suspension point: persister read loops, detector workers, and the
//! ML wait loop all select on it and exit promptly once it flips.

use tokio::sync::watch;

/// Sending half held by the binary entry point
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Flip the flag; every clone of the paired [`Shutdown`] observes it.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half cloned into each task
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A receiver that never fires, for one-shot invocations and tests.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the channel stays open for the process lifetime.
        std::mem::forget(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested (or the sender is gone).
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Create a linked signal/receiver pair.
pub fn channel() -> (ShutdownSignal, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSignal { tx }, Shutdown { rx })
}

/// Trigger the signal when the process receives Ctrl+C / SIGTERM.
pub fn listen_for_signals(signal: ShutdownSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            signal.trigger();
        }
    });
}
