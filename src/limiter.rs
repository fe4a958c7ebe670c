//! Per-client sliding-window admission control.
//!
//! State is process-local and lost on restart; a client seen again after a
//! cold start effectively gets a fresh quota. That trade-off is accepted for
//! the public endpoints this guards.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

/// Construction-time configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    /// A zero-length window almost always indicates a unit mixup in
    /// configuration, so it is rejected instead of expiring everything
    /// immediately.
    #[error("rate limit window must be non-zero")]
    ZeroWindow,
}

/// Sliding-window rate limiter keyed by client identity.
///
/// Admissions are counted over the trailing window ending "now", not over
/// fixed calendar buckets. The prune-compare-append sequence for one identity
/// runs under that identity's map entry guard, so concurrent calls for the
/// same identity can never jointly exceed the quota; calls for distinct
/// identities only contend on shard locks.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: DashMap<String, Vec<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting at most `max_requests` per `window`.
    ///
    /// `max_requests = 0` is legal and rejects every request.
    pub fn new(max_requests: usize, window: Duration) -> Result<Self, LimiterError> {
        if window.is_zero() {
            return Err(LimiterError::ZeroWindow);
        }
        Ok(Self {
            windows: DashMap::new(),
            max_requests,
            window,
        })
    }

    /// Admit or reject a request arriving now.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Admission check against an explicit clock reading.
    ///
    /// Entries older than `now - window` are pruned first on every call,
    /// admitted or not. On admission `now` is appended to the identity's
    /// window; a rejection mutates nothing beyond the prune.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut entry = self.windows.entry(identity.to_owned()).or_default();
        // checked_sub: the cutoff can predate process start early in life,
        // in which case nothing can have expired yet.
        if let Some(cutoff) = now.checked_sub(self.window) {
            entry.retain(|admitted| *admitted > cutoff);
        }
        if entry.len() >= self.max_requests {
            return false;
        }
        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn zero_window_is_a_construction_error() {
        let err = SlidingWindowLimiter::new(5, Duration::ZERO).unwrap_err();
        assert_eq!(err, LimiterError::ZeroWindow);
    }

    #[test]
    fn admits_up_to_quota_then_rejects() {
        let limiter = SlidingWindowLimiter::new(3, WINDOW).unwrap();
        let now = Instant::now();
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(!limiter.allow_at("10.0.0.1", now));
    }

    #[test]
    fn zero_quota_rejects_everything() {
        let limiter = SlidingWindowLimiter::new(0, WINDOW).unwrap();
        assert!(!limiter.allow_at("10.0.0.1", Instant::now()));
    }

    #[test]
    fn quota_frees_up_as_the_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, WINDOW).unwrap();
        let base = Instant::now();
        assert!(limiter.allow_at("client", base));
        assert!(limiter.allow_at("client", base + Duration::from_secs(4)));
        assert!(!limiter.allow_at("client", base + Duration::from_secs(8)));
        // the admission at `base` has expired, the one at base+4s has not
        let later = base + Duration::from_millis(10_500);
        assert!(limiter.allow_at("client", later));
        assert!(!limiter.allow_at("client", later));
    }

    #[test]
    fn bursty_arrivals_never_exceed_quota_within_any_window() {
        let limiter = SlidingWindowLimiter::new(5, WINDOW).unwrap();
        let base = Instant::now();
        let mut admitted = Vec::new();
        for i in 0..40 {
            let at = base + Duration::from_millis(i * 700);
            if limiter.allow_at("client", at) {
                admitted.push(at);
            }
        }
        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| **t - *start <= WINDOW)
                .count();
            assert!(in_window <= 5, "window starting at admission {i} holds {in_window}");
        }
    }

    #[test]
    fn identities_have_independent_windows() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW).unwrap();
        let now = Instant::now();
        assert!(limiter.allow_at("a", now));
        assert!(limiter.allow_at("b", now));
        assert!(!limiter.allow_at("a", now));
    }

    #[test]
    fn concurrent_burst_for_one_identity_respects_quota() {
        let limiter = Arc::new(SlidingWindowLimiter::new(5, WINDOW).unwrap());
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        if limiter.allow("shared") {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 5);
    }
}
