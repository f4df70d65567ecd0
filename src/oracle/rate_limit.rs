//! Admission control for the investigation entry point and outbound quota
//! for evidence source calls.
//!
//! Client admission is a per-key sliding window: timestamps older than the
//! window are pruned on every call and the request is rejected once the pruned
//! count reaches the ceiling. Outbound calls share a `governor` quota so a
//! burst of investigations cannot hammer upstream APIs.

use crate::oracle::error::InvestigationError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Per-client sliding-window admission limiter.
pub struct ClientRateLimiter {
    window: Duration,
    max_requests: usize,
    retry_after: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl ClientRateLimiter {
    /// Create a limiter admitting `max_requests` per `window` for each client.
    pub fn new(window: Duration, max_requests: usize, retry_after: Duration) -> Self {
        Self {
            window,
            max_requests,
            retry_after,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a request for `client_key` or reject it with a fixed retry-after.
    #[instrument(skip(self))]
    pub fn admit(&self, client_key: &str) -> Result<(), InvestigationError> {
        self.admit_at(client_key, Instant::now())
    }

    fn admit_at(&self, client_key: &str, now: Instant) -> Result<(), InvestigationError> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Drop clients whose whole history fell out of the window
        clients.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });

        let stamps = clients.entry(client_key.to_string()).or_default();
        if stamps.len() >= self.max_requests {
            warn!(
                "Rate limit exceeded for {}: {} requests in {:?}",
                client_key,
                stamps.len(),
                self.window
            );
            return Err(InvestigationError::RateLimited {
                client: client_key.to_string(),
                retry_after: self.retry_after,
            });
        }

        stamps.push_back(now);
        debug!("Admitted {} ({}/{})", client_key, stamps.len(), self.max_requests);
        Ok(())
    }

    /// Requests currently counted against `client_key`.
    pub fn in_window(&self, client_key: &str) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .get_mut(client_key)
            .map(|stamps| {
                prune(stamps, now, self.window);
                stamps.len()
            })
            .unwrap_or(0)
    }

    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = stamps.front() {
        if now.saturating_duration_since(*front) >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

/// Process-wide quota shared by all evidence source calls.
pub struct OutboundThrottle {
    limiter: DefaultDirectRateLimiter,
    requests_per_second: u32,
}

impl OutboundThrottle {
    pub fn new(requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            requests_per_second: per_second.get(),
        }
    }

    /// Wait until a permit is available.
    pub async fn acquire(&self) {
        if self.limiter.check().is_err() {
            debug!("Outbound quota of {} req/s exhausted, waiting", self.requests_per_second);
            self.limiter.until_ready().await;
        }
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_ceiling() {
        let limiter = ClientRateLimiter::new(Duration::from_secs(60), 5, Duration::from_secs(60));

        for _ in 0..5 {
            assert!(limiter.admit("bot-a").is_ok());
        }

        let err = limiter.admit("bot-a").unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(limiter.in_window("bot-a"), 5);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = ClientRateLimiter::new(Duration::from_secs(60), 1, Duration::from_secs(60));

        assert!(limiter.admit("bot-a").is_ok());
        assert!(limiter.admit("bot-b").is_ok());
        assert!(limiter.admit("bot-a").is_err());
    }

    #[test]
    fn test_window_slides() {
        let limiter = ClientRateLimiter::new(Duration::from_secs(60), 2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.admit_at("bot", start).is_ok());
        assert!(limiter.admit_at("bot", start + Duration::from_secs(30)).is_ok());
        assert!(limiter.admit_at("bot", start + Duration::from_secs(45)).is_err());

        // First stamp has aged out, one slot frees up
        assert!(limiter.admit_at("bot", start + Duration::from_secs(61)).is_ok());
        assert!(limiter.admit_at("bot", start + Duration::from_secs(62)).is_err());
    }

    #[test]
    fn test_rejections_do_not_extend_window() {
        let limiter = ClientRateLimiter::new(Duration::from_secs(10), 1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.admit_at("bot", start).is_ok());
        for s in 1..10 {
            assert!(limiter.admit_at("bot", start + Duration::from_secs(s)).is_err());
        }
        assert!(limiter.admit_at("bot", start + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn test_retry_after_is_constant() {
        let limiter = ClientRateLimiter::new(Duration::from_secs(60), 3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.admit("bot").unwrap();
        }
        for _ in 0..10 {
            let err = limiter.admit("bot").unwrap_err();
            assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
        }
    }

    #[tokio::test]
    async fn test_outbound_throttle_allows_burst() {
        let throttle = OutboundThrottle::new(10);
        assert_eq!(throttle.requests_per_second(), 10);
        for _ in 0..5 {
            throttle.acquire().await;
        }
    }

    #[test]
    fn test_outbound_throttle_zero_quota_clamped() {
        let throttle = OutboundThrottle::new(0);
        assert_eq!(throttle.requests_per_second(), 1);
    }
}
