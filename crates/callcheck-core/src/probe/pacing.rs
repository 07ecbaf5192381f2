//! Pacing between sequential probe attempts
//!
//! Probes never sleep directly. They ask a [`Pacer`] for the gap, so tests
//! can count and inspect the pauses without waiting on a wall clock.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Externally controlled delay between attempts
pub trait Pacer: Send + Sync {
    /// Wait for `gap` before the next attempt
    fn pause(&self, gap: Duration) -> impl Future<Output = ()> + Send;
}

/// Real pacing on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

impl Pacer for TokioPacer {
    async fn pause(&self, gap: Duration) {
        tokio::time::sleep(gap).await;
    }
}

/// Pacer that returns immediately and remembers every requested gap
#[derive(Debug, Default)]
pub struct InstantPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl InstantPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gaps requested so far, in order
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Pacer for InstantPacer {
    async fn pause(&self, gap: Duration) {
        if let Ok(mut pauses) = self.pauses.lock() {
            pauses.push(gap);
        }
    }
}
