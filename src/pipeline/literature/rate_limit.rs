use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute request window for a single source. A request over
/// quota is refused, never queued.
pub struct RateLimiter {
    per_minute: u32,
    granted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            granted: Mutex::new(VecDeque::with_capacity(per_minute as usize)),
        }
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one slot at `now` if fewer than `per_minute` were granted in the
    /// preceding minute.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut granted = self.granted.lock().unwrap_or_else(|e| e.into_inner());
        while granted
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= WINDOW)
        {
            granted.pop_front();
        }

        if granted.len() as u32 >= self.per_minute {
            return false;
        }
        granted.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourth_request_within_a_minute_is_refused() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start));
        assert!(limiter.try_acquire_at(start + Duration::from_secs(10)));
        assert!(limiter.try_acquire_at(start + Duration::from_secs(20)));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(59)));
    }

    #[test]
    fn slots_free_up_after_a_minute() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start));
        assert!(limiter.try_acquire_at(start + Duration::from_secs(30)));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(45)));
        assert!(limiter.try_acquire_at(start + Duration::from_secs(60)));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(61)));
    }

    #[test]
    fn refused_requests_do_not_consume_slots() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start));
        for s in 1..10 {
            assert!(!limiter.try_acquire_at(start + Duration::from_secs(s)));
        }
        assert!(limiter.try_acquire_at(start + Duration::from_secs(60)));
    }

    #[test]
    fn zero_quota_disables_source() {
        let limiter = RateLimiter::new(0);
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.per_minute(), 0);
    }
}
