//! Graceful shutdown (spec §4.6): a single shared SIGTERM/SIGINT
//! installation, since "multiple workers in the same process must share a
//! single installation of signal handlers to avoid clobbering."

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Hands out a clone of the underlying receiver for loops (e.g. the
    /// scheduler's) that need to `select!` on a change rather than poll
    /// `is_set()`.
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

/// Installs the process-wide signal handler once and returns a cheaply
/// cloneable handle every worker loop polls. Calling this more than once
/// per process installs more than one handler — callers must share the
/// single `ShutdownSignal` this returns rather than calling it per worker.
pub fn install() -> ShutdownSignal {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, starting graceful shutdown"),
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, starting graceful shutdown"),
        }
        let _ = tx.send(true);
    });
    ShutdownSignal { rx }
}
