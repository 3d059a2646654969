//! Synchronous front door to the asynchronous automation backend.
//!
//! A bridge owns one Tokio current-thread runtime parked on a dedicated
//! background thread for the rest of the process. Synchronous callers hand it
//! futures through [`AsyncBridge::run`] and block until they complete. Every
//! environment sharing a bridge is serialized on that one thread.
//!
//! Ordering: a thread that waits for each `run` before issuing the next sees
//! its operations execute in submission order. Futures submitted concurrently
//! from several threads get no ordering guarantee; callers that need one must
//! serialize themselves.
//!
//! There is no cancellation or timeout. A submitted future runs to completion;
//! wrap it in `tokio::time::timeout` if a deadline is needed.

use std::future::Future;
use std::sync::{Mutex, OnceLock, mpsc};

use thiserror::Error;
use tokio::runtime::{Builder, Handle};
use tracing::debug;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to start bridge worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("bridge worker exited before reporting its runtime")]
    WorkerGone,
    #[error("bridge task was cancelled")]
    Cancelled,
    #[error("AsyncBridge::run called from inside an async runtime")]
    NestedRuntime,
}

#[derive(Debug, Clone)]
pub struct AsyncBridge {
    handle: Handle,
}

static GLOBAL: OnceLock<AsyncBridge> = OnceLock::new();
static GLOBAL_INIT: Mutex<()> = Mutex::new(());

impl AsyncBridge {
    /// Start a new worker thread with its own runtime.
    pub fn spawn() -> Result<Self, BridgeError> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("async-bridge".to_string())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };
                if tx.send(Ok(runtime.handle().clone())).is_err() {
                    return;
                }
                // Drive spawned tasks until the process exits.
                runtime.block_on(std::future::pending::<()>());
            })?;

        let handle = rx.recv().map_err(|_| BridgeError::WorkerGone)??;
        debug!("async bridge worker started");
        Ok(Self { handle })
    }

    /// Process-wide bridge, created on first use. Concurrent first calls
    /// still produce exactly one worker.
    pub fn global() -> Result<Self, BridgeError> {
        if let Some(bridge) = GLOBAL.get() {
            return Ok(bridge.clone());
        }
        let _guard = GLOBAL_INIT.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bridge) = GLOBAL.get() {
            return Ok(bridge.clone());
        }
        let bridge = Self::spawn()?;
        let _ = GLOBAL.set(bridge.clone());
        Ok(bridge)
    }

    /// Run `fut` on the worker and block the calling thread until it
    /// finishes. The future's output is returned untouched, so a failed
    /// backend call surfaces with its own error type. A panic inside the
    /// future is resumed on the calling thread.
    pub fn run<F>(&self, fut: F) -> Result<F::Output, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(BridgeError::NestedRuntime);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let task = self.handle.spawn(async move {
            let out = fut.await;
            let _ = tx.send(out);
        });
        match rx.recv() {
            Ok(out) => Ok(out),
            Err(_) => {
                // The sender was dropped without a value: the task panicked
                // or the runtime shut down.
                match self.handle.block_on(task) {
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(_) => Err(BridgeError::Cancelled),
                    Ok(()) => Err(BridgeError::WorkerGone),
                }
            }
        }
    }

    /// Identity of the worker thread a future would run on.
    pub fn worker_thread_name(&self) -> Result<Option<String>, BridgeError> {
        self.run(async { std::thread::current().name().map(str::to_string) })
    }
}
