use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::classify::ErrorCode;

/// Default rolling window (5 minutes).
pub const DEFAULT_ERROR_WINDOW: Duration = Duration::from_millis(300_000);

/// Default number of occurrences inside the window that counts as a burst.
pub const DEFAULT_ERROR_THRESHOLD: usize = 5;

/// Sliding-window error counter keyed by classified error code.
///
/// Occurrences older than the window are pruned lazily on every `record` /
/// `check_threshold`, and eagerly by an optional background sweep, so codes
/// that stop occurring do not linger in memory.
pub struct ErrorRateTracker {
    window: Duration,
    occurrences: Mutex<HashMap<ErrorCode, VecDeque<Instant>>>,
    sweeper: Mutex<Option<Sweeper>>,
}

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ErrorRateTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            occurrences: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn record(&self, code: ErrorCode) {
        self.record_at(code, Instant::now());
    }

    pub fn record_at(&self, code: ErrorCode, now: Instant) {
        let mut map = self.lock();
        let times = map.entry(code).or_default();
        prune(times, now, self.window);
        times.push_back(now);
        debug!(%code, count = times.len(), "tracked error");
    }

    /// Prune `code` against `window` and report whether at least `threshold`
    /// occurrences remain.
    pub fn check_threshold(&self, code: ErrorCode, threshold: usize, window: Duration) -> bool {
        self.check_threshold_at(code, threshold, window, Instant::now())
    }

    pub fn check_threshold_at(
        &self,
        code: ErrorCode,
        threshold: usize,
        window: Duration,
        now: Instant,
    ) -> bool {
        let mut map = self.lock();
        let Some(times) = map.get_mut(&code) else {
            return false;
        };
        prune(times, now, window);
        let count = times.len();
        if count == 0 {
            map.remove(&code);
        }
        count >= threshold
    }

    /// Occurrences of `code` currently held (not pruned).
    pub fn count(&self, code: ErrorCode) -> usize {
        self.lock().get(&code).map(VecDeque::len).unwrap_or(0)
    }

    pub fn tracked_codes(&self) -> Vec<ErrorCode> {
        self.lock().keys().copied().collect()
    }

    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    /// Prune every code and drop the ones left empty.
    pub fn sweep_at(&self, now: Instant) {
        let mut map = self.lock();
        map.retain(|_, times| {
            prune(times, now, self.window);
            !times.is_empty()
        });
    }

    /// Start the periodic sweep. A second call while one is running is a no-op.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let mut slot = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tracker = Arc::downgrade(self);
        let interval = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let Some(tracker) = tracker.upgrade() else {
                            break;
                        };
                        tracker.sweep();
                    }
                }
            }
        });

        *slot = Some(Sweeper { cancel, handle });
    }

    /// Stop the sweep task. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(s) = sweeper {
            s.cancel.cancel();
            s.handle.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ErrorCode, VecDeque<Instant>>> {
        self.occurrences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ErrorRateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_WINDOW)
    }
}

impl Drop for ErrorRateTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Drop occurrences that fell out of the window ending at `now`.
fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while times
        .front()
        .map(|t| now.saturating_duration_since(*t) >= window)
        .unwrap_or(false)
    {
        times.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn five_errors_inside_window_cross_threshold() {
        let start = Instant::now();
        let tracker = ErrorRateTracker::new(WINDOW);
        let code = ErrorCode::UnknownTransport(500);

        for i in 0..5u64 {
            tracker.record_at(code, start + Duration::from_secs(i * 10));
        }
        assert!(tracker.check_threshold_at(code, 5, WINDOW, start + Duration::from_secs(45)));
    }

    #[test]
    fn fifth_error_after_first_expires_stays_below_threshold() {
        let start = Instant::now();
        let tracker = ErrorRateTracker::new(WINDOW);
        let code = ErrorCode::BadRequest;

        tracker.record_at(code, start);
        for i in 1..4u64 {
            tracker.record_at(code, start + Duration::from_secs(i));
        }
        let late = start + WINDOW + Duration::from_millis(1);
        tracker.record_at(code, late);

        assert!(!tracker.check_threshold_at(code, 5, WINDOW, late));
        assert_eq!(tracker.count(code), 4);
    }

    #[test]
    fn codes_are_counted_independently() {
        let now = Instant::now();
        let tracker = ErrorRateTracker::new(WINDOW);
        for _ in 0..5 {
            tracker.record_at(ErrorCode::Forbidden, now);
        }
        tracker.record_at(ErrorCode::RateLimited, now);

        assert!(tracker.check_threshold_at(ErrorCode::Forbidden, 5, WINDOW, now));
        assert!(!tracker.check_threshold_at(ErrorCode::RateLimited, 5, WINDOW, now));
        assert!(!tracker.check_threshold_at(ErrorCode::NonTransport, 1, WINDOW, now));
    }

    #[test]
    fn check_drops_codes_left_empty() {
        let start = Instant::now();
        let tracker = ErrorRateTracker::new(WINDOW);
        tracker.record_at(ErrorCode::Forbidden, start);

        assert!(!tracker.check_threshold_at(
            ErrorCode::Forbidden,
            1,
            WINDOW,
            start + WINDOW
        ));
        assert!(tracker.tracked_codes().is_empty());
    }

    #[test]
    fn sweep_removes_expired_codes_only() {
        let start = Instant::now();
        let tracker = ErrorRateTracker::new(WINDOW);
        tracker.record_at(ErrorCode::Forbidden, start);
        tracker.record_at(ErrorCode::BadRequest, start + Duration::from_secs(200));

        tracker.sweep_at(start + Duration::from_secs(301));

        assert_eq!(tracker.tracked_codes(), vec![ErrorCode::BadRequest]);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_returns_map_to_baseline() {
        let window = Duration::from_millis(500);
        let tracker = Arc::new(ErrorRateTracker::new(window));
        tracker.start_sweeper(window);
        assert!(tracker.tracked_codes().is_empty());

        tracker.record(ErrorCode::UnknownTransport(502));
        tracker.record(ErrorCode::NonTransport);
        assert_eq!(tracker.tracked_codes().len(), 2);

        tokio::time::sleep(window * 3).await;

        assert!(tracker.tracked_codes().is_empty());
        tracker.shutdown();
        tracker.shutdown();
    }
}
