//! Repeated-failure tracking per caller context.
//!
//! Observability only: the tracker never blocks a request. A streak starts
//! at the first failure and lasts for the configured window; a failure
//! after the window starts a new streak. Expired streaks are swept at most
//! once per window, and the number of tracked contexts is capped.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct FailureRecord {
    count: u32,
    first_failure: Instant,
    first_failure_at: DateTime<Utc>,
    last_failure_at: DateTime<Utc>,
    recent_errors: VecDeque<String>,
}

/// Point-in-time view of one caller's failure streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbuseSnapshot {
    pub count: u32,
    pub first_failure_at: DateTime<Utc>,
    pub last_failure_at: DateTime<Utc>,
    pub recent_errors: Vec<String>,
}

/// Raised once per streak, when the failure count reaches the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbuseAlert {
    pub key: String,
    pub count: u32,
    pub window_secs: u64,
    pub recent_errors: Vec<String>,
}

const DEFAULT_MAX_CONTEXTS: usize = 10_000;

#[derive(Debug)]
struct TrackerState {
    records: HashMap<String, FailureRecord>,
    last_sweep: Instant,
}

#[derive(Debug)]
pub struct AbuseTracker {
    threshold: u32,
    window: Duration,
    recent_limit: usize,
    max_contexts: usize,
    state: Mutex<TrackerState>,
}

impl AbuseTracker {
    pub fn new(threshold: u32, window: Duration, recent_limit: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            recent_limit: recent_limit.max(1),
            max_contexts: DEFAULT_MAX_CONTEXTS,
            state: Mutex::new(TrackerState {
                records: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn with_max_contexts(mut self, max_contexts: usize) -> Self {
        self.max_contexts = max_contexts.max(1);
        self
    }

    /// Tracker key for a caller context.
    pub fn key(command: &str, user: &str) -> String {
        format!("{command}:{user}")
    }

    pub fn record_failure(&self, key: &str, message: &str) -> Option<AbuseAlert> {
        let now = Instant::now();
        let wall = Utc::now();
        let mut state = self.state.lock();
        if now.duration_since(state.last_sweep) >= self.window {
            let window = self.window;
            state
                .records
                .retain(|_, record| now.duration_since(record.first_failure) <= window);
            state.last_sweep = now;
        }
        if !state.records.contains_key(key) && state.records.len() >= self.max_contexts {
            let stalest = state
                .records
                .iter()
                .min_by_key(|(_, record)| record.first_failure)
                .map(|(stale_key, _)| stale_key.clone());
            if let Some(stale_key) = stalest {
                state.records.remove(&stale_key);
            }
        }

        let record = state
            .records
            .entry(key.to_string())
            .or_insert_with(|| FailureRecord {
                count: 0,
                first_failure: now,
                first_failure_at: wall,
                last_failure_at: wall,
                recent_errors: VecDeque::new(),
            });

        if now.duration_since(record.first_failure) > self.window {
            record.count = 0;
            record.first_failure = now;
            record.first_failure_at = wall;
            record.recent_errors.clear();
        }

        record.count += 1;
        record.last_failure_at = wall;
        if record.recent_errors.len() == self.recent_limit {
            record.recent_errors.pop_front();
        }
        record.recent_errors.push_back(message.to_string());

        (record.count == self.threshold).then(|| AbuseAlert {
            key: key.to_string(),
            count: record.count,
            window_secs: self.window.as_secs(),
            recent_errors: record.recent_errors.iter().cloned().collect(),
        })
    }

    /// Forget the streak for `key`, typically after a successful request.
    pub fn reset(&self, key: &str) {
        self.state.lock().records.remove(key);
    }

    pub fn snapshot(&self, key: &str) -> Option<AbuseSnapshot> {
        self.state.lock().records.get(key).map(|record| AbuseSnapshot {
            count: record.count,
            first_failure_at: record.first_failure_at,
            last_failure_at: record.last_failure_at,
            recent_errors: record.recent_errors.iter().cloned().collect(),
        })
    }

    pub fn tracked_contexts(&self) -> usize {
        self.state.lock().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alerts_once_per_streak() {
        let tracker = AbuseTracker::new(3, Duration::from_secs(60), 5);
        let key = AbuseTracker::key("new", "x");
        let alerts: Vec<_> = (0..6)
            .filter_map(|i| tracker.record_failure(&key, &format!("error {i}")))
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].count, 3);
        assert_eq!(alerts[0].key, "new:x");
    }

    #[test]
    fn recent_errors_are_bounded() {
        let tracker = AbuseTracker::new(100, Duration::from_secs(60), 2);
        for i in 0..5 {
            tracker.record_failure("k", &format!("e{i}"));
        }
        let snapshot = tracker.snapshot("k").unwrap();
        assert_eq!(snapshot.count, 5);
        assert_eq!(snapshot.recent_errors, vec!["e3".to_string(), "e4".to_string()]);
    }

    #[test]
    fn reset_clears_streak() {
        let tracker = AbuseTracker::new(2, Duration::from_secs(60), 5);
        tracker.record_failure("k", "e");
        tracker.reset("k");
        assert!(tracker.snapshot("k").is_none());
        assert!(tracker.record_failure("k", "e").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_starts_new_streak() {
        let tracker = AbuseTracker::new(3, Duration::from_secs(60), 5);
        tracker.record_failure("k", "e");
        tracker.record_failure("k", "e");
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(tracker.record_failure("k", "e").is_none());
        assert_eq!(tracker.snapshot("k").unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_contexts_are_swept() {
        let tracker = AbuseTracker::new(3, Duration::from_secs(60), 5);
        for user in ["a", "b", "c"] {
            tracker.record_failure(&AbuseTracker::key("new", user), "e");
        }
        assert_eq!(tracker.tracked_contexts(), 3);

        tokio::time::advance(Duration::from_secs(61)).await;
        tracker.record_failure(&AbuseTracker::key("new", "d"), "e");
        assert_eq!(tracker.tracked_contexts(), 1);
        assert!(tracker.snapshot("new:a").is_none());
        assert_eq!(tracker.snapshot("new:d").unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalest_context_is_evicted_at_capacity() {
        let tracker = AbuseTracker::new(3, Duration::from_secs(60), 5).with_max_contexts(2);
        tracker.record_failure("first", "e");
        tokio::time::advance(Duration::from_secs(1)).await;
        tracker.record_failure("second", "e");
        tokio::time::advance(Duration::from_secs(1)).await;
        tracker.record_failure("second", "e");
        tracker.record_failure("third", "e");

        assert_eq!(tracker.tracked_contexts(), 2);
        assert!(tracker.snapshot("first").is_none());
        assert_eq!(tracker.snapshot("second").unwrap().count, 2);
    }
}
