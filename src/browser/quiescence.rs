//! Network quiescence tracking.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};

use super::{BrowserError, QuiescencePolicy};

/// Tracks in-flight requests for one navigation and reports when the page
/// has been quiet long enough.
///
/// The quiet period starts whenever the in-flight count drops to
/// `max_inflight` or below, and is cancelled whenever it rises above it.
/// A completion seen before its start is remembered, so the late start is
/// not counted as in flight.
#[derive(Debug)]
pub struct InflightTracker {
    inflight: HashSet<String>,
    finished_early: HashSet<String>,
    max_inflight: usize,
    idle_window: Duration,
    quiet_since: Option<Instant>,
}

impl InflightTracker {
    /// Starts tracking at `now` with nothing in flight.
    #[must_use]
    pub fn new(policy: &QuiescencePolicy, now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            finished_early: HashSet::new(),
            max_inflight: policy.max_inflight,
            idle_window: policy.idle_window,
            quiet_since: Some(now),
        }
    }

    /// Records a request start.
    pub fn request_started(&mut self, request_id: impl Into<String>, now: Instant) {
        let request_id = request_id.into();
        if self.finished_early.remove(&request_id) {
            return;
        }
        self.inflight.insert(request_id);
        self.refresh(now);
    }

    /// Records a request finishing or failing.
    pub fn request_finished(&mut self, request_id: &str, now: Instant) {
        if self.inflight.remove(request_id) {
            self.refresh(now);
        } else {
            self.finished_early.insert(request_id.to_string());
        }
    }

    /// Number of requests currently in flight.
    #[must_use]
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Returns true once the quiet period has lasted `idle_window`.
    #[must_use]
    pub fn is_quiet(&self, now: Instant) -> bool {
        self.quiet_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.idle_window)
    }

    /// Time left until the page becomes quiet, if it is currently in a quiet period.
    #[must_use]
    pub fn time_until_quiet(&self, now: Instant) -> Option<Duration> {
        self.quiet_since.map(|since| {
            self.idle_window
                .saturating_sub(now.saturating_duration_since(since))
        })
    }

    fn refresh(&mut self, now: Instant) {
        if self.inflight.len() > self.max_inflight {
            self.quiet_since = None;
        } else if self.quiet_since.is_none() {
            self.quiet_since = Some(now);
        }
    }
}

/// Consumes request start and end events until the page is quiet.
///
/// `started` yields request ids as requests are sent; `finished` yields ids
/// of requests that completed or failed. Both may already hold events that
/// arrived while the navigation itself was awaited. Starts are always
/// drained before ends, so a buffered pair is never seen end-first.
///
/// Returns the number of requests still in flight once quiet. The caller
/// bounds the wait with the navigation timeout.
///
/// # Errors
///
/// Returns [`BrowserError::Closed`] if both streams end while the page is
/// still busy.
pub async fn wait_until_quiet<S, F>(
    policy: &QuiescencePolicy,
    started: S,
    finished: F,
) -> Result<usize, BrowserError>
where
    S: Stream<Item = String> + Unpin,
    F: Stream<Item = String> + Unpin,
{
    let mut started = started.fuse();
    let mut finished = finished.fuse();
    let mut tracker = InflightTracker::new(policy, Instant::now());

    loop {
        let now = Instant::now();
        if tracker.is_quiet(now) {
            return Ok(tracker.inflight());
        }
        let wait = tracker.time_until_quiet(now);
        tokio::select! {
            biased;
            Some(request_id) = started.next() => {
                tracker.request_started(request_id, Instant::now());
            }
            Some(request_id) = finished.next() => {
                tracker.request_finished(&request_id, Instant::now());
            }
            () = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {}
            else => return Err(BrowserError::Closed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn policy() -> QuiescencePolicy {
        QuiescencePolicy::default()
    }

    fn fast_policy(max_inflight: usize) -> QuiescencePolicy {
        QuiescencePolicy {
            timeout: Duration::from_secs(5),
            idle_window: Duration::from_millis(20),
            max_inflight,
        }
    }

    fn ids(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("req-{i}")).collect()
    }

    #[test]
    fn test_idle_page_is_quiet_after_window() {
        let start = Instant::now();
        let tracker = InflightTracker::new(&policy(), start);
        assert!(!tracker.is_quiet(start));
        assert!(tracker.is_quiet(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_two_inflight_requests_are_tolerated() {
        let start = Instant::now();
        let mut tracker = InflightTracker::new(&policy(), start);
        tracker.request_started("a", start);
        tracker.request_started("b", start);
        assert_eq!(tracker.inflight(), 2);
        assert!(tracker.is_quiet(start + Duration::from_millis(600)));
    }

    #[test]
    fn test_third_request_cancels_quiet_period() {
        let start = Instant::now();
        let mut tracker = InflightTracker::new(&policy(), start);
        tracker.request_started("a", start);
        tracker.request_started("b", start);
        tracker.request_started("c", start + Duration::from_millis(400));
        assert!(!tracker.is_quiet(start + Duration::from_millis(600)));
        assert_eq!(tracker.time_until_quiet(start), None);

        let drop_at = start + Duration::from_millis(700);
        tracker.request_finished("c", drop_at);
        assert!(!tracker.is_quiet(drop_at + Duration::from_millis(499)));
        assert!(tracker.is_quiet(drop_at + Duration::from_millis(500)));
    }

    #[test]
    fn test_unknown_completion_does_not_restart_quiet_period() {
        let start = Instant::now();
        let mut tracker = InflightTracker::new(&policy(), start);
        tracker.request_finished("never-started", start + Duration::from_millis(300));
        assert_eq!(
            tracker.time_until_quiet(start + Duration::from_millis(300)),
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn test_start_after_its_completion_is_not_inflight() {
        let start = Instant::now();
        let mut tracker = InflightTracker::new(&fast_policy(0), start);
        for id in ids(5) {
            tracker.request_finished(&id, start);
        }
        for id in ids(5) {
            tracker.request_started(id, start);
        }
        assert_eq!(tracker.inflight(), 0);
        assert!(tracker.is_quiet(start + Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_wait_until_quiet_on_idle_page() {
        let inflight = wait_until_quiet(&fast_policy(2), stream::pending(), stream::pending())
            .await
            .unwrap();
        assert_eq!(inflight, 0);
    }

    #[tokio::test]
    async fn test_wait_until_quiet_with_buffered_events_never_leaves_phantoms() {
        for _ in 0..50 {
            let started = stream::iter(ids(20)).chain(stream::pending());
            let finished = stream::iter(ids(20)).chain(stream::pending());
            let inflight = tokio::time::timeout(
                Duration::from_secs(2),
                wait_until_quiet(&fast_policy(2), started, finished),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(inflight, 0);
        }
    }

    #[tokio::test]
    async fn test_wait_until_quiet_when_ends_arrive_before_starts() {
        let late_first = stream::once(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            String::from("req-0")
        });
        let started = Box::pin(
            late_first
                .chain(stream::iter(ids(10).into_iter().skip(1)))
                .chain(stream::pending()),
        );
        let finished = stream::iter(ids(10)).chain(stream::pending());

        let inflight = tokio::time::timeout(
            Duration::from_secs(2),
            wait_until_quiet(&fast_policy(0), started, finished),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(inflight, 0);
    }

    #[tokio::test]
    async fn test_wait_until_quiet_blocks_while_too_many_inflight() {
        let started = stream::iter(ids(3)).chain(stream::pending());
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            wait_until_quiet(&fast_policy(2), started, stream::pending()),
        )
        .await;
        assert!(result.is_err(), "page with 3 open requests must not be quiet");
    }

    #[tokio::test]
    async fn test_wait_until_quiet_fails_when_streams_close_while_busy() {
        let result = wait_until_quiet(
            &fast_policy(0),
            stream::iter(ids(1)),
            stream::empty::<String>(),
        )
        .await;
        assert!(matches!(result, Err(BrowserError::Closed)));
    }
}
