//! Trailing-window hashrate gauge.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default averaging window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Attempts-per-second averaged over a trailing window of samples.
///
/// Workers call [`mark`](Self::mark) after each nonce batch; readers call
/// [`rate`](Self::rate). Samples older than the window are discarded.
#[derive(Debug)]
pub struct HashrateMeter {
    window: Duration,
    started: Instant,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl HashrateMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            started: Instant::now(),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Record `attempts` hashes completed now.
    pub fn mark(&self, attempts: u64) {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        samples.push_back((now, attempts));
        Self::prune(&mut samples, now, self.window);
    }

    /// Hashes per second over the trailing window (or since creation, if shorter).
    pub fn rate(&self) -> f64 {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        Self::prune(&mut samples, now, self.window);
        let total: u64 = samples.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return 0.0;
        }
        let span = now.duration_since(self.started).min(self.window);
        total as f64 / span.as_secs_f64().max(1e-3)
    }

    fn prune(samples: &mut VecDeque<(Instant, u64)>, now: Instant, window: Duration) {
        while let Some(&(at, _)) = samples.front() {
            if now.duration_since(at) > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for HashrateMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
