//! Clock port: the only place the pipeline waits on wall time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

/// Clock suspends the calling task for a duration.
///
/// Countdowns and simulated work go through this so tests can swap in
/// [`InstantClock`] and run a whole chain without waiting.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately (after yielding) and counts how often it was asked to sleep.
#[derive(Debug, Default)]
pub struct InstantClock {
    sleeps: AtomicUsize,
}

impl InstantClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instant_clock_counts_sleeps() {
        let clock = InstantClock::new();
        clock.sleep(Duration::from_secs(3600)).await;
        clock.sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.sleeps(), 2);
    }

    #[tokio::test]
    async fn tokio_clock_waits_at_least_the_duration() {
        let start = tokio::time::Instant::now();
        TokioClock.sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
