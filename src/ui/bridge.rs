// EventLoopBridge - Coordinates the controller thread with the tokio runtime
//
// The controller owns all session and presentation state and runs on a single
// thread. Long operations (install batches) run on tokio's blocking pool while
// the controller thread keeps pumping worker events, so notices from a running
// session are still handled during an install.

use std::future::Future;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use thiserror::Error;

/// How often the controller pumps events while waiting on a background task.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Background task ended without a result")]
    TaskAborted,
}

/// Hands work to the tokio runtime on behalf of the controller thread.
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let bridge = EventLoopBridge::new(runtime.handle().clone());
///
/// let total = bridge.run_blocking(|| expensive_copy(), || controller_pump())?;
/// ```
#[derive(Debug, Clone)]
pub struct EventLoopBridge {
    tokio_handle: tokio::runtime::Handle,
    poll_interval: Duration,
}

impl EventLoopBridge {
    pub fn new(tokio_handle: tokio::runtime::Handle) -> Self {
        Self {
            tokio_handle,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.tokio_handle
    }

    /// Spawn a fire-and-forget async task on the runtime.
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }

    /// Run `task` on the blocking pool and call `pump` until it finishes.
    ///
    /// `pump` runs on the calling thread between polls. Safe to call from
    /// inside a runtime context because it never blocks on a future.
    pub fn run_blocking<T, F, P>(&self, task: F, mut pump: P) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        P: FnMut(),
    {
        let (result_tx, result_rx) = std_mpsc::channel();
        self.tokio_handle.spawn_blocking(move || {
            let _ = result_tx.send(task());
        });

        loop {
            match result_rx.recv_timeout(self.poll_interval) {
                Ok(value) => return Ok(value),
                Err(std_mpsc::RecvTimeoutError::Timeout) => pump(),
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    tracing::error!("Background task panicked or was dropped");
                    return Err(BridgeError::TaskAborted);
                }
            }
        }
    }
}
