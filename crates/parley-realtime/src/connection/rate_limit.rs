//! Per-user sliding-window rate limiter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use parley_core::config::RateLimitConfig;
use parley_core::error::AppError;
use parley_core::types::UserId;

/// Sliding-log limiter keyed by user.
///
/// Every accepted event is timestamped; events older than the window fall
/// out of the log before each check.
#[derive(Debug)]
pub struct RateLimiter {
    logs: DashMap<UserId, VecDeque<Instant>>,
    max_events: usize,
    window: Duration,
}

impl RateLimiter {
    /// Creates a new rate limiter.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            logs: DashMap::new(),
            max_events: config.max_events,
            window: config.window(),
        }
    }

    /// Records an event for the user, or rejects it if the budget is spent.
    pub fn check(&self, user_id: UserId) -> Result<(), AppError> {
        self.check_at(user_id, Instant::now())
    }

    /// [`Self::check`] with an explicit clock.
    pub fn check_at(&self, user_id: UserId, now: Instant) -> Result<(), AppError> {
        let mut log = self.logs.entry(user_id).or_default();
        while log
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            log.pop_front();
        }

        if log.len() >= self.max_events {
            return Err(AppError::rate_limited(
                "Too many events, please slow down",
            ));
        }

        log.push_back(now);
        Ok(())
    }

    /// Forget a user's log, called when their last connection closes.
    pub fn reset(&self, user_id: UserId) {
        self.logs.remove(&user_id);
    }

    /// Number of users with a live log.
    pub fn tracked_users(&self) -> usize {
        self.logs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ErrorKind;

    fn limiter(max_events: usize) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_events,
            window_seconds: 60,
        })
    }

    #[test]
    fn test_rejects_over_budget() {
        let limiter = limiter(3);
        let user = UserId::new();
        let now = Instant::now();
        for _ in 0..3 {
            limiter.check_at(user, now).unwrap();
        }
        let err = limiter.check_at(user, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);

        // Other users have their own budget.
        assert!(limiter.check_at(UserId::new(), now).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = limiter(2);
        let user = UserId::new();
        let start = Instant::now();
        limiter.check_at(user, start).unwrap();
        limiter.check_at(user, start + Duration::from_secs(30)).unwrap();
        assert!(limiter.check_at(user, start + Duration::from_secs(59)).is_err());
        assert!(limiter.check_at(user, start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_reset_clears_log() {
        let limiter = limiter(1);
        let user = UserId::new();
        limiter.check(user).unwrap();
        assert!(limiter.check(user).is_err());
        limiter.reset(user);
        assert_eq!(limiter.tracked_users(), 0);
        assert!(limiter.check(user).is_ok());
    }
}
