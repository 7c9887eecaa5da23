//! Cooperative shutdown signal shared by all background tasks.
//!
//! Tasks must not start a new unit of work after the signal fires; in-flight
//! work finishes inside the drain window enforced by the binary.

use tokio::sync::watch;

/// Sender half; closing it (or calling [`ShutdownHandle::shutdown`]) wakes
/// every listening task.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signal shutdown to every subscriber.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver half carried by each background task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Non-blocking check, for loop guards.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is signalled.
    pub async fn recv(&mut self) {
        // A closed channel counts as shutdown too.
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Create a connected handle/signal pair.
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}
