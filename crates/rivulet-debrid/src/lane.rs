//! Single-lane pacing for outbound upstream requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Serializes callers and enforces a minimum interval between dispatches.
///
/// The lane is a mutex over the last dispatch time that is held across the
/// pacing sleep, so concurrent callers queue up and are released one at a
/// time, each no earlier than `min_interval` after the previous dispatch.
#[derive(Debug)]
pub(crate) struct Lane {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl Lane {
    pub(crate) const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::const_new(None),
        }
    }

    /// Wait for the lane to open, then claim the next dispatch slot.
    pub(crate) async fn admit(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            sleep_until(previous + self.min_interval).await;
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spaced_by_the_minimum_interval() {
        let interval = Duration::from_millis(1000);
        let lane = Arc::new(Lane::new(interval));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lane = Arc::clone(&lane);
            let stamps = Arc::clone(&stamps);
            handles.push(tokio::spawn(async move {
                lane.admit().await;
                stamps.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.expect("admit task should not panic");
        }

        let mut stamps = stamps.lock().await.clone();
        stamps.sort_unstable();
        for pair in stamps.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_dispatch_is_immediate() {
        let lane = Lane::new(Duration::from_secs(5));
        let before = Instant::now();
        lane.admit().await;
        assert_eq!(Instant::now(), before);
    }
}
