use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Spaces outbound catalog requests at least `min_interval` apart.
///
/// The timestamp lock is held while waiting, so callers that overlap are
/// queued behind each other instead of racing on a stale timestamp.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspends until the interval since the previous pass has elapsed, then
    /// stamps the current time.
    pub async fn pass(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval - elapsed;
                debug!(delay_ms = delay.as_millis() as u64, "rate gate holding request");
                sleep(delay).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_pass_is_immediate() {
        let gate = RateGate::default();
        let start = Instant::now();
        gate.pass().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_passes_are_spaced() {
        let gate = RateGate::default();
        gate.pass().await;
        let first = Instant::now();
        gate.pass().await;
        let second = Instant::now();
        gate.pass().await;
        let third = Instant::now();
        assert!(second - first >= DEFAULT_MIN_INTERVAL);
        assert!(third - second >= DEFAULT_MIN_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_after_interval_has_passed() {
        let gate = RateGate::new(Duration::from_millis(500));
        gate.pass().await;
        sleep(Duration::from_millis(800)).await;
        let before = Instant::now();
        gate.pass().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_callers_are_serialised() {
        let gate = RateGate::default();
        let start = Instant::now();
        let (a, b, c) = tokio::join!(
            async {
                gate.pass().await;
                Instant::now()
            },
            async {
                gate.pass().await;
                Instant::now()
            },
            async {
                gate.pass().await;
                Instant::now()
            }
        );
        let mut stamps = [a - start, b - start, c - start];
        stamps.sort();
        assert!(stamps[1] - stamps[0] >= DEFAULT_MIN_INTERVAL);
        assert!(stamps[2] - stamps[1] >= DEFAULT_MIN_INTERVAL);
    }
}
