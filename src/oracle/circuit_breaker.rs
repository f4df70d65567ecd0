//! Circuit breaker for capture provider health tracking.
//!
//! A provider that fails too many times in a row is quarantined for a
//! cooldown period, so a dead primary does not spend its whole deadline on
//! every investigation before the chain falls through.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// State of a provider in the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    /// Provider can be used
    Healthy,
    /// Provider is in cooldown after too many failures
    CoolingDown,
}

/// Health tracking for one provider.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub state: ProviderState,
    pub consecutive_failures: u32,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub cooldown_start: Option<Instant>,
}

impl ProviderHealth {
    fn new() -> Self {
        Self {
            state: ProviderState::Healthy,
            consecutive_failures: 0,
            total_attempts: 0,
            successful_attempts: 0,
            cooldown_start: None,
        }
    }
}

pub struct CircuitBreaker {
    providers: HashMap<String, ProviderHealth>,
    failure_threshold: u32,
    cooldown_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            failure_threshold: failure_threshold.max(1),
            cooldown_duration: cooldown,
        }
    }

    #[instrument(skip(self))]
    pub fn record_success(&mut self, provider: &str) {
        let health = self
            .providers
            .entry(provider.to_string())
            .or_insert_with(ProviderHealth::new);

        health.total_attempts += 1;
        health.successful_attempts += 1;
        health.consecutive_failures = 0;
        health.state = ProviderState::Healthy;
        health.cooldown_start = None;
    }

    #[instrument(skip(self))]
    pub fn record_failure(&mut self, provider: &str) {
        let threshold = self.failure_threshold;
        let health = self
            .providers
            .entry(provider.to_string())
            .or_insert_with(ProviderHealth::new);

        health.total_attempts += 1;
        health.consecutive_failures += 1;

        if health.state == ProviderState::Healthy && health.consecutive_failures >= threshold {
            health.state = ProviderState::CoolingDown;
            health.cooldown_start = Some(Instant::now());
            warn!(
                "Capture provider {} entering cooldown after {} consecutive failures",
                provider, health.consecutive_failures
            );
        }
    }

    /// Check whether a provider may be tried. An expired cooldown lets the
    /// provider back in with a clean failure count.
    pub fn is_available(&mut self, provider: &str) -> bool {
        let Some(health) = self.providers.get_mut(provider) else {
            return true;
        };

        match health.state {
            ProviderState::Healthy => true,
            ProviderState::CoolingDown => {
                let expired = health
                    .cooldown_start
                    .map(|start| start.elapsed() >= self.cooldown_duration)
                    .unwrap_or(true);
                if expired {
                    health.state = ProviderState::Healthy;
                    health.cooldown_start = None;
                    health.consecutive_failures = 0;
                    debug!("Capture provider {} cooldown expired", provider);
                }
                expired
            }
        }
    }

    pub fn state(&self, provider: &str) -> ProviderState {
        self.providers
            .get(provider)
            .map(|h| h.state)
            .unwrap_or(ProviderState::Healthy)
    }

    pub fn health(&self, provider: &str) -> Option<&ProviderHealth> {
        self.providers.get(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_available() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(breaker.is_available("primary"));
        assert_eq!(breaker.state("primary"), ProviderState::Healthy);
    }

    #[test]
    fn test_trips_after_threshold() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure("primary");
        breaker.record_failure("primary");
        assert!(breaker.is_available("primary"));

        breaker.record_failure("primary");
        assert!(!breaker.is_available("primary"));
        assert_eq!(breaker.state("primary"), ProviderState::CoolingDown);
    }

    #[test]
    fn test_success_resets_failures() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure("primary");
        breaker.record_success("primary");
        breaker.record_failure("primary");
        assert!(breaker.is_available("primary"));

        let health = breaker.health("primary").unwrap();
        assert_eq!(health.total_attempts, 3);
        assert_eq!(health.successful_attempts, 1);
        assert_eq!(health.consecutive_failures, 1);
    }

    #[test]
    fn test_cooldown_expires() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure("primary");
        assert!(!breaker.is_available("primary"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(breaker.is_available("primary"));
        assert_eq!(breaker.health("primary").unwrap().consecutive_failures, 0);
    }
}
