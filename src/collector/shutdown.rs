//! Cooperative shutdown signal for workers

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Receiving side of the shutdown broadcast
///
/// Once a shutdown message (or a lagged notice) is observed the signal stays
/// triggered. A closed channel is not a shutdown request: with no sender
/// left, nobody can ask the worker to stop.
pub struct ShutdownSignal {
    rx: Option<broadcast::Receiver<()>>,
    triggered: bool,
}

impl ShutdownSignal {
    /// Wrap a receiver from the shutdown broadcast channel
    pub fn new(rx: broadcast::Receiver<()>) -> Self {
        Self {
            rx: Some(rx),
            triggered: false,
        }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        Self {
            rx: None,
            triggered: false,
        }
    }

    /// Non-blocking check
    pub fn is_triggered(&mut self) -> bool {
        if self.triggered {
            return true;
        }
        if let Some(rx) = self.rx.as_mut() {
            match rx.try_recv() {
                Ok(()) | Err(TryRecvError::Lagged(_)) => self.triggered = true,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => self.rx = None,
            }
        }
        self.triggered
    }

    /// Wait until shutdown is requested; pends forever if it never is
    ///
    /// Cancel safe, so it can be raced in `tokio::select!`.
    pub async fn triggered(&mut self) {
        if self.triggered {
            return;
        }
        if let Some(rx) = self.rx.as_mut() {
            match rx.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    self.triggered = true;
                    return;
                }
                Err(RecvError::Closed) => self.rx = None,
            }
        }
        std::future::pending::<()>().await
    }
}
