// Duplicate-message detector. Flags a user as spamming once they've sent
// the same content `threshold` times inside a rolling `window`.
//
// State is an LRU+TTL cache bounded by `max_users`: the `lru` crate gives us
// the recency-ordered eviction for free (the same mechanism the bot's
// `DashMap`-backed stores use for unbounded in-memory maps, just with an
// actual bound here because this cache is attacker-controlled: every
// distinct user id creates an entry).

use super::pipeline::Detector;
use super::types::{Request, Response};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);
const DEFAULT_MAX_USERS: usize = 10_000;

/// Per-user sliding-window history. Invariants (checked in tests, relied on
/// by callers): every entry's hash appears in `hash_counts`;
/// `hash_counts.values().sum() == entries.len()`; every entry satisfies
/// `now - timestamp <= window`.
#[derive(Debug, Default)]
struct UserHistory {
    entries: VecDeque<(String, Instant)>,
    hash_counts: HashMap<String, u32>,
}

impl UserHistory {
    /// Drop entries older than `window`, rebuild the count map, then record
    /// `now`'s arrival of `hash`. Returns the resulting count for `hash`.
    fn record(&mut self, hash: &str, now: Instant, window: Duration) -> u32 {
        while let Some((_, ts)) = self.entries.front() {
            if now.duration_since(*ts) > window {
                let (old_hash, _) = self.entries.pop_front().unwrap();
                if let Some(count) = self.hash_counts.get_mut(&old_hash) {
                    *count -= 1;
                    if *count == 0 {
                        self.hash_counts.remove(&old_hash);
                    }
                }
            } else {
                break;
            }
        }

        self.entries.push_back((hash.to_string(), now));
        let count = self.hash_counts.entry(hash.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep expired entries without inserting anything new.
    fn sweep(&mut self, now: Instant, window: Duration) {
        while let Some((_, ts)) = self.entries.front() {
            if now.duration_since(*ts) > window {
                let (old_hash, _) = self.entries.pop_front().unwrap();
                if let Some(count) = self.hash_counts.get_mut(&old_hash) {
                    *count -= 1;
                    if *count == 0 {
                        self.hash_counts.remove(&old_hash);
                    }
                }
            } else {
                break;
            }
        }
    }
}

struct CacheEntry {
    history: UserHistory,
    last_seen: Instant,
}

struct DuplicateState {
    cache: LruCache<String, CacheEntry>,
    last_cleanup: Instant,
}

/// Flags repeated identical messages from the same user within a window.
///
/// `threshold <= 0` disables the detector entirely (every request comes
/// back not-spam with `"check disabled"`) rather than treating it as a
/// configuration error.
pub struct DuplicateDetector {
    threshold: u32,
    window: Duration,
    cleanup_interval: Duration,
    state: Mutex<DuplicateState>,
}

impl DuplicateDetector {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self::with_limits(threshold, window, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_USERS)
    }

    pub fn with_limits(
        threshold: u32,
        window: Duration,
        cleanup_interval: Duration,
        max_users: usize,
    ) -> Self {
        let cap = NonZeroUsize::new(max_users.max(1)).unwrap();
        Self {
            threshold,
            window,
            cleanup_interval,
            state: Mutex::new(DuplicateState {
                cache: LruCache::new(cap),
                last_cleanup: Instant::now(),
            }),
        }
    }

    pub fn tracked_users(&self) -> usize {
        self.state.lock().expect("duplicate detector mutex poisoned").cache.len()
    }

    fn hash(msg: &str) -> String {
        format!("{:x}", Sha256::digest(msg.as_bytes()))
    }

    /// Periodic sweep over every cached user: filter expired entries,
    /// evicting any user left with no surviving entries. Also evicts users
    /// who have been inactive for longer than `2 * window`, regardless of
    /// how many (now-expired) entries they still have on record.
    fn sweep(state: &mut DuplicateState, now: Instant, window: Duration) {
        let keys: Vec<String> = state.cache.iter().map(|(k, _)| k.clone()).collect();
        let ttl = window.saturating_mul(2);
        for key in keys {
            let evict = if let Some(entry) = state.cache.get_mut(&key) {
                entry.history.sweep(now, window);
                entry.history.is_empty() || now.duration_since(entry.last_seen) > ttl
            } else {
                false
            };
            if evict {
                state.cache.pop(&key);
            }
        }
    }

    pub fn check(&self, req: &Request) -> Response {
        const NAME: &str = "duplicate";

        if self.threshold == 0 {
            return Response::not_spam(NAME, "check disabled");
        }
        if req.user_id.is_empty() || req.user_id.parse::<i64>().is_err() {
            return Response::not_spam(NAME, "invalid user id");
        }

        let hash = Self::hash(&req.msg);
        let now = Instant::now();

        let mut state = self.state.lock().expect("duplicate detector mutex poisoned");

        if now.duration_since(state.last_cleanup) > self.cleanup_interval {
            Self::sweep(&mut state, now, self.window);
            state.last_cleanup = now;
        }

        let ttl = self.window.saturating_mul(2);
        if let Some(entry) = state.cache.peek(&req.user_id) {
            if now.duration_since(entry.last_seen) > ttl {
                state.cache.pop(&req.user_id);
            }
        }

        if state.cache.get(&req.user_id).is_none() {
            state.cache.put(
                req.user_id.clone(),
                CacheEntry {
                    history: UserHistory::default(),
                    last_seen: now,
                },
            );
        }

        let entry = state
            .cache
            .get_mut(&req.user_id)
            .expect("entry was just inserted");
        let count = entry.history.record(&hash, now, self.window);
        entry.last_seen = now;

        if count >= self.threshold {
            Response::spam(
                NAME,
                format!(
                    "message repeated {count} times in {:?}",
                    self.window
                ),
            )
        } else {
            Response::not_spam(NAME, format!("seen {count} time(s) in window"))
        }
    }
}

impl Detector for DuplicateDetector {
    fn name(&self) -> &str {
        "duplicate"
    }

    fn check(&self, req: &Request) -> Response {
        DuplicateDetector::check(self, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn req(msg: &str, user: &str) -> Request {
        Request::new(msg, user)
    }

    #[test]
    fn s1_duplicate_window_threshold_three() {
        let d = DuplicateDetector::new(3, Duration::from_secs(3600));
        assert!(!d.check(&req("hello", "123")).spam);
        assert!(!d.check(&req("hello", "123")).spam);
        let third = d.check(&req("hello", "123"));
        assert!(third.spam);
        assert!(third.details.contains("repeated 3"));
        assert!(d.check(&req("hello", "123")).spam);
    }

    #[test]
    fn s2_cross_user_isolation() {
        let d = DuplicateDetector::new(2, Duration::from_secs(3600));
        assert!(!d.check(&req("same", "123")).spam);
        assert!(!d.check(&req("same", "456")).spam);
        assert!(d.check(&req("same", "123")).spam);
        assert!(!d.check(&req("same", "456")).spam);
    }

    #[test]
    fn s3_decay_after_window_elapses() {
        let d = DuplicateDetector::new(2, Duration::from_millis(100));
        assert!(!d.check(&req("x", "1")).spam);
        assert!(d.check(&req("x", "1")).spam);
        sleep(Duration::from_millis(150));
        assert!(!d.check(&req("x", "1")).spam);
    }

    #[test]
    fn s4_lru_eviction_bounded_by_max_users() {
        let d = DuplicateDetector::with_limits(2, Duration::from_secs(3600), Duration::from_secs(600), 3);
        for uid in ["0", "1", "2", "3", "4"] {
            d.check(&req("hi", uid));
        }
        assert!(d.tracked_users() <= 3);
        assert!(!d.check(&req("second message", "4")).spam);
        assert!(d.check(&req("second message", "4")).spam);
    }

    #[test]
    fn disabled_detector_is_inert() {
        let d = DuplicateDetector::new(0, Duration::from_secs(60));
        let r = d.check(&req("spam spam spam", "1"));
        assert!(!r.spam);
        assert_eq!(r.details, "check disabled");
    }

    #[test]
    fn non_numeric_user_id_is_never_tracked() {
        let d = DuplicateDetector::new(1, Duration::from_secs(60));
        let r = d.check(&req("hi", "not-a-number"));
        assert!(!r.spam);
        assert_eq!(r.details, "invalid user id");
    }
}
