//! Concurrent, cancellable batch header verification.
//!
//! A batch of `N` headers is checked by `min(threads, N)` worker threads
//! pulling indices from a shared counter. Each worker reports
//! `(index, outcome)` to a collector thread, which buffers out-of-order
//! outcomes and forwards them to the caller strictly in input order over a
//! channel with room for all `N` results, so the collector never blocks.
//!
//! Cancellation is cooperative: a worker checks its [`Halt`] before taking
//! the next index. Work already dispatched finishes, but the collector only
//! ever forwards the contiguous prefix of completed indices, so an aborted
//! batch yields a prefix of its outcomes and then closes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use forge_core::error::ConsensusError;
use forge_core::types::Header;
use tokio::sync::mpsc;

use crate::lifecycle::{Halt, Lifecycle, StopSignal};

/// Outcome of verifying one header.
pub type VerifyResult = Result<(), ConsensusError>;

/// Handle to a running verification batch.
///
/// Dropping the handle aborts the batch.
#[derive(Debug)]
pub struct Verification {
    abort: StopSignal,
    results: mpsc::Receiver<VerifyResult>,
    len: usize,
}

impl Verification {
    /// Number of headers submitted in this batch.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stop dispatching further headers. Idempotent.
    pub fn abort(&self) {
        self.abort.stop();
    }

    /// A cloneable handle that aborts this batch when stopped.
    pub fn abort_handle(&self) -> StopSignal {
        self.abort.clone()
    }

    /// Next outcome in input order, or `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<VerifyResult> {
        self.results.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv).
    ///
    /// Panics if called from within an async runtime, like
    /// [`mpsc::Receiver::blocking_recv`].
    pub fn blocking_recv(&mut self) -> Option<VerifyResult> {
        self.results.blocking_recv()
    }

    /// Drain every outcome until the stream closes.
    pub fn collect_blocking(mut self) -> Vec<VerifyResult> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(result) = self.results.blocking_recv() {
            out.push(result);
        }
        out
    }
}

impl Drop for Verification {
    fn drop(&mut self) {
        self.abort.stop();
    }
}

/// Start verifying `headers` in the background.
///
/// `check(headers, index, seal)` validates one header; it may consult
/// `headers[index - 1]` as the parent.
pub(crate) fn spawn_verification<F>(
    lifecycle: &Lifecycle,
    headers: Vec<Header>,
    seals: Vec<bool>,
    threads: usize,
    check: F,
) -> Result<Verification, ConsensusError>
where
    F: Fn(&[Header], usize, bool) -> VerifyResult + Send + Sync + 'static,
{
    lifecycle.ensure_open()?;
    if headers.len() != seals.len() {
        return Err(ConsensusError::BatchLengthMismatch {
            headers: headers.len(),
            seals: seals.len(),
        });
    }

    let total = headers.len();
    let abort = StopSignal::new();
    let (out_tx, out_rx) = mpsc::channel(total.max(1));
    let verification = Verification {
        abort: abort.clone(),
        results: out_rx,
        len: total,
    };
    if total == 0 {
        return Ok(verification);
    }

    let halt = Halt::new([abort.clone(), lifecycle.shutdown_signal()]);
    let headers: Arc<[Header]> = headers.into();
    let seals: Arc<[bool]> = seals.into();
    let check = Arc::new(check);
    let next = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, VerifyResult)>();

    lifecycle.spawn("forge-verify-collect".into(), move || {
        let mut pending: Vec<Option<VerifyResult>> = (0..total).map(|_| None).collect();
        let mut delivered = 0;
        while let Some((index, result)) = done_rx.blocking_recv() {
            pending[index] = Some(result);
            while delivered < total {
                let Some(ready) = pending[delivered].take() else {
                    break;
                };
                if out_tx.blocking_send(ready).is_err() {
                    tracing::debug!(delivered, total, "verification receiver dropped");
                    return;
                }
                delivered += 1;
            }
        }
        tracing::debug!(delivered, total, "verification batch finished");
    })?;

    let workers = threads.max(1).min(total);
    for worker in 0..workers {
        let halt = halt.clone();
        let headers = Arc::clone(&headers);
        let seals = Arc::clone(&seals);
        let check = Arc::clone(&check);
        let next = Arc::clone(&next);
        let done_tx = done_tx.clone();
        let spawned = lifecycle.spawn(format!("forge-verify-{worker}"), move || {
            loop {
                if halt.is_halted() {
                    break;
                }
                let index = next.fetch_add(1, Ordering::SeqCst);
                if index >= total {
                    break;
                }
                let result = check(&headers, index, seals[index]);
                if done_tx.send((index, result)).is_err() {
                    break;
                }
            }
        });
        if let Err(e) = spawned {
            abort.stop();
            return Err(e);
        }
    }

    tracing::debug!(headers = total, workers, "verification batch started");
    Ok(verification)
}
