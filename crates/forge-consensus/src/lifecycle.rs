//! Stop signals and background worker accounting.
//!
//! Every verification batch and seal search runs on plain OS threads spawned
//! through a [`Lifecycle`]. The lifecycle counts live workers and owns the
//! engine-wide shutdown signal; each worker polls a [`Halt`] made of its own
//! call's signals plus that shutdown signal, so closing the engine stops all
//! outstanding work without tracking individual calls.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use forge_core::error::ConsensusError;

/// Cloneable, idempotent cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Repeated calls have no further effect.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Set of signals, any of which halts a worker.
#[derive(Debug, Clone)]
pub(crate) struct Halt(Vec<StopSignal>);

impl Halt {
    pub(crate) fn new(signals: impl IntoIterator<Item = StopSignal>) -> Self {
        Self(signals.into_iter().collect())
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.0.iter().any(StopSignal::is_stopped)
    }
}

/// Decrements the live-worker count when the worker thread exits, panics included.
struct WorkerGuard(Arc<AtomicUsize>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine-wide shutdown flag plus live-worker count.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    shutdown: StopSignal,
    workers: Arc<AtomicUsize>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `Err(EngineClosed)` once [`close`](Self::close) has been called.
    pub(crate) fn ensure_open(&self) -> Result<(), ConsensusError> {
        if self.shutdown.is_stopped() {
            return Err(ConsensusError::EngineClosed);
        }
        Ok(())
    }

    pub(crate) fn shutdown_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    /// Raise the shutdown signal. Returns `true` on the first call only.
    pub(crate) fn close(&self) -> bool {
        !self.shutdown.0.swap(true, Ordering::SeqCst)
    }

    /// Number of background worker threads still running.
    pub(crate) fn active_workers(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    /// Spawn a named worker thread that is counted until it exits.
    pub(crate) fn spawn<F>(&self, name: String, f: F) -> Result<JoinHandle<()>, ConsensusError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.workers.fetch_add(1, Ordering::SeqCst);
        let guard = WorkerGuard(Arc::clone(&self.workers));
        std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let _guard = guard;
                f();
            })
            .map_err(|e| ConsensusError::Spawn(e.to_string()))
    }
}
