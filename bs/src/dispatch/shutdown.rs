//! Graceful-shutdown signal
//!
//! An explicit channel between the process signal handlers and the dispatch
//! engine. The engine observes it at every suspension point and performs an
//! orderly flush-then-stop instead of relying on exit hooks.

use tokio::sync::watch;

/// Which OS signal requested the stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Interrupt,
    Terminate,
}

impl ShutdownKind {
    /// Conventional exit code for the signal (128 + signum)
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownKind::Interrupt => 130,
            ShutdownKind::Terminate => 143,
        }
    }
}

impl std::fmt::Display for ShutdownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownKind::Interrupt => f.write_str("SIGINT"),
            ShutdownKind::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Sender half, owned by the signal handler task
pub struct ShutdownHandle {
    tx: watch::Sender<Option<ShutdownKind>>,
}

impl ShutdownHandle {
    /// Request an orderly stop; later triggers keep the first kind
    pub fn trigger(&self, kind: ShutdownKind) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(kind);
                true
            } else {
                false
            }
        });
    }
}

/// Receiver half, observed by the dispatch engine between suspension points
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownKind>>,
}

impl ShutdownSignal {
    /// Non-blocking check
    pub fn requested(&self) -> Option<ShutdownKind> {
        *self.rx.borrow()
    }

    /// Resolves when a shutdown is requested; never resolves if the handle
    /// is dropped without one
    pub async fn wait(&mut self) -> ShutdownKind {
        loop {
            if let Some(kind) = *self.rx.borrow_and_update() {
                return kind;
            }
            if self.rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(None);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}
