//! Asynchronous proof-of-work sealing.
//!
//! A seal call spawns `threads` search workers. Each starts from a random
//! nonce, hashes in batches of `batch_size`, feeds the attempt count to the
//! [`HashrateMeter`] and checks its stop conditions between batches. The
//! first worker to find a seal publishes the sealed block with a
//! non-blocking send and tells its siblings to stop. A worker that finds a
//! seal while the result buffer is full drops it with a warning.
//!
//! When `max_attempts` is set each worker gives up after that many nonces;
//! once every worker has exited the result stream closes, empty if nothing
//! was found.

use std::sync::Arc;

use forge_core::error::ConsensusError;
use forge_core::types::Block;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::hashrate::HashrateMeter;
use crate::lifecycle::{Halt, Lifecycle, StopSignal};
use crate::pow::{meets_target, pow_digest, target};

/// Receiving side of a seal call.
///
/// Dropping it stops the search. Workers re-check the stop signals right
/// before publishing, but a block already handed to the channel when
/// [`stop`](Self::stop) is called may still be received.
#[derive(Debug)]
pub struct SealResults {
    stop: StopSignal,
    receiver: mpsc::Receiver<Block>,
}

impl SealResults {
    pub(crate) fn new(stop: StopSignal, receiver: mpsc::Receiver<Block>) -> Self {
        Self { stop, receiver }
    }

    /// Stop the search. Idempotent.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Next sealed block, or `None` once every worker has exited.
    pub async fn recv(&mut self) -> Option<Block> {
        self.receiver.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv). Must not be called from an
    /// async runtime.
    pub fn blocking_recv(&mut self) -> Option<Block> {
        self.receiver.blocking_recv()
    }
}

impl Drop for SealResults {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Nonce search parameters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchParams {
    pub threads: usize,
    pub batch_size: u64,
    pub max_attempts: Option<u64>,
    pub capacity: usize,
}

/// Start a multi-threaded nonce search for `block`.
pub(crate) fn spawn_search(
    lifecycle: &Lifecycle,
    hashrate: Arc<HashrateMeter>,
    block: Block,
    params: SearchParams,
    caller_stop: StopSignal,
) -> Result<SealResults, ConsensusError> {
    lifecycle.ensure_open()?;

    let internal = StopSignal::new();
    let found = StopSignal::new();
    let stopped = Halt::new([caller_stop, internal.clone(), lifecycle.shutdown_signal()]);
    let (tx, rx) = mpsc::channel(params.capacity.max(1));
    let results = SealResults::new(internal.clone(), rx);

    let block = Arc::new(block);
    let seal_hash = block.header.seal_hash();
    let target = target(block.header.difficulty);
    let number = block.number();
    let batch_size = params.batch_size.max(1);
    let threads = params.threads.max(1);

    tracing::debug!(number, threads, difficulty = %block.header.difficulty, "seal search started");

    for worker in 0..threads {
        let stopped = stopped.clone();
        let found = found.clone();
        let tx = tx.clone();
        let block = Arc::clone(&block);
        let hashrate = Arc::clone(&hashrate);
        let seed: u64 = rand::random();

        let spawned = lifecycle.spawn(format!("forge-seal-{worker}"), move || {
            let mut nonce = seed;
            let mut attempts: u64 = 0;
            loop {
                if stopped.is_halted() || found.is_stopped() {
                    break;
                }
                let batch = match params.max_attempts {
                    Some(max) => batch_size.min(max.saturating_sub(attempts)),
                    None => batch_size,
                };
                if batch == 0 {
                    tracing::debug!(number, worker, attempts, "nonce budget exhausted");
                    break;
                }

                let mut hit = None;
                let mut tried = 0;
                while tried < batch {
                    let digest = pow_digest(&seal_hash, nonce);
                    tried += 1;
                    if meets_target(&digest, target) {
                        hit = Some((nonce, digest));
                        break;
                    }
                    nonce = nonce.wrapping_add(1);
                }
                attempts += tried;
                hashrate.mark(tried);

                let Some((winning, digest)) = hit else {
                    continue;
                };
                if stopped.is_halted() {
                    break;
                }
                found.stop();
                let mut header = block.header.clone();
                header.nonce = winning;
                header.mix_digest = digest.mix_digest;
                if publish(&stopped, &tx, block.with_header(header)) {
                    tracing::info!(number, nonce = winning, attempts, "sealed block");
                }
                break;
            }
        });
        if let Err(e) = spawned {
            internal.stop();
            return Err(e);
        }
    }
    Ok(results)
}

/// Send `sealed` unless `stopped` has fired. Returns whether it was sent.
pub(crate) fn publish(stopped: &Halt, tx: &mpsc::Sender<Block>, sealed: Block) -> bool {
    let number = sealed.number();
    let hash = sealed.hash();
    if stopped.is_halted() {
        tracing::debug!(number, %hash, "seal found after stop, discarding");
        return false;
    }
    match tx.try_send(sealed) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(number, %hash, "seal result buffer full, dropping result");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(number, "seal receiver dropped");
            false
        }
    }
}

/// A result stream that already holds `block` and is closed.
pub(crate) fn ready(block: Block) -> SealResults {
    let (tx, rx) = mpsc::channel(1);
    tx.try_send(block).ok();
    SealResults::new(StopSignal::new(), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::verify_pow;
    use forge_core::types::{Header, U256};
    use std::time::{Duration, Instant};

    fn block(difficulty: u64) -> Block {
        Block {
            header: Header {
                number: 3,
                difficulty: U256::from(difficulty),
                timestamp: 1_767_225_630,
                ..Header::default()
            },
            ..Block::default()
        }
    }

    fn params(threads: usize) -> SearchParams {
        SearchParams {
            threads,
            batch_size: 64,
            max_attempts: None,
            capacity: 1,
        }
    }

    fn wait_idle(lifecycle: &Lifecycle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while lifecycle.active_workers() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(lifecycle.active_workers(), 0);
    }

    #[test]
    fn finds_verifiable_seal() {
        let lifecycle = Lifecycle::new();
        let meter = Arc::new(HashrateMeter::default());
        let mut results = spawn_search(
            &lifecycle,
            Arc::clone(&meter),
            block(256),
            params(2),
            StopSignal::new(),
        )
        .unwrap();
        let sealed = results.blocking_recv().expect("seal");
        assert_eq!(verify_pow(&sealed.header), Ok(()));
        assert_eq!(sealed.header.seal_hash(), block(256).header.seal_hash());
        assert!(meter.rate() > 0.0);
        // Siblings stop and the stream closes.
        assert!(results.blocking_recv().is_none());
        wait_idle(&lifecycle);
    }

    #[test]
    fn caller_stop_halts_search() {
        let lifecycle = Lifecycle::new();
        let stop = StopSignal::new();
        let mut results = spawn_search(
            &lifecycle,
            Arc::new(HashrateMeter::default()),
            block(u64::MAX),
            params(2),
            stop.clone(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        stop.stop();
        stop.stop();
        assert!(results.blocking_recv().is_none());
        wait_idle(&lifecycle);
    }

    #[test]
    fn exhausted_budget_closes_without_result() {
        let lifecycle = Lifecycle::new();
        let mut p = params(2);
        p.max_attempts = Some(500);
        let mut results = spawn_search(
            &lifecycle,
            Arc::new(HashrateMeter::default()),
            block(u64::MAX),
            p,
            StopSignal::new(),
        )
        .unwrap();
        assert!(results.blocking_recv().is_none());
        wait_idle(&lifecycle);
    }

    #[test]
    fn shutdown_halts_search() {
        let lifecycle = Lifecycle::new();
        let mut results = spawn_search(
            &lifecycle,
            Arc::new(HashrateMeter::default()),
            block(u64::MAX),
            params(3),
            StopSignal::new(),
        )
        .unwrap();
        lifecycle.close();
        assert!(results.blocking_recv().is_none());
        wait_idle(&lifecycle);
    }

    #[test]
    fn dropping_results_stops_workers() {
        let lifecycle = Lifecycle::new();
        let results = spawn_search(
            &lifecycle,
            Arc::new(HashrateMeter::default()),
            block(u64::MAX),
            params(2),
            StopSignal::new(),
        )
        .unwrap();
        drop(results);
        wait_idle(&lifecycle);
    }

    #[test]
    fn closed_lifecycle_rejects_seal() {
        let lifecycle = Lifecycle::new();
        lifecycle.close();
        let err = spawn_search(
            &lifecycle,
            Arc::new(HashrateMeter::default()),
            block(1),
            params(1),
            StopSignal::new(),
        )
        .unwrap_err();
        assert_eq!(err, ConsensusError::EngineClosed);
    }

    #[test]
    fn publish_after_stop_sends_nothing() {
        let stop = StopSignal::new();
        let halt = Halt::new([stop.clone()]);
        let (tx, mut rx) = mpsc::channel(1);
        stop.stop();
        assert!(!publish(&halt, &tx, block(1)));
        drop(tx);
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn publish_reports_full_buffer() {
        let halt = Halt::new([StopSignal::new()]);
        let (tx, mut rx) = mpsc::channel(1);
        assert!(publish(&halt, &tx, block(1)));
        assert!(!publish(&halt, &tx, block(2)));
        drop(tx);
        assert_eq!(rx.blocking_recv().map(|b| b.header.difficulty), Some(U256::from(1u64)));
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn ready_stream_yields_once() {
        let mut results = ready(block(1));
        assert_eq!(results.blocking_recv().map(|b| b.number()), Some(3));
        assert!(results.blocking_recv().is_none());
    }
}
