//! Circuit breaker for the vector store connection
//!
//! Tracks consecutive connection failures and temporarily rejects new
//! attempts while the backend is down, instead of hammering it.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Configuration for the circuit breaker
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit trips
    pub failure_threshold: u32,

    /// How long a tripped circuit stays open before allowing a single probe
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Circuit state.
#[derive(Debug, Clone)]
enum State {
    /// Normal operation, counting consecutive failures.
    Closed { failures: u32 },
    /// Tripped; all requests are rejected until cooldown expires.
    Open { tripped_at: Instant },
    /// Cooldown expired; exactly one probe request is allowed.
    HalfOpen,
}

impl Default for State {
    fn default() -> Self {
        Self::Closed { failures: 0 }
    }
}

/// Thread-safe connection circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<State>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            config,
        }
    }

    /// Check whether a connection attempt is currently allowed.
    ///
    /// Returns `true` if the circuit is Closed or transitions to HalfOpen
    /// (allowing a single probe). Returns `false` while the circuit is
    /// Open and the cooldown has not elapsed, and while a half-open probe
    /// is already in flight.
    pub fn is_available(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return true; // If the mutex is poisoned, allow the request
        };

        match &*state {
            State::Closed { .. } => true,
            State::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.config.cooldown {
                    info!("Circuit half-open, allowing probe connection");
                    *state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => false,
        }
    }

    /// Record a successful operation, resetting the circuit to Closed.
    pub fn record_success(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let was_half_open = matches!(*state, State::HalfOpen);
        *state = State::Closed { failures: 0 };

        if was_half_open {
            info!("Circuit recovered (half-open probe succeeded)");
        }
    }

    /// Record a failed operation, which may trip the circuit.
    pub fn record_failure(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let now = Instant::now();

        match &mut *state {
            State::Closed { failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    warn!(
                        failures = *failures,
                        "Circuit tripped, connection attempts rejected for {}s",
                        self.config.cooldown.as_secs()
                    );
                    *state = State::Open { tripped_at: now };
                }
            }
            State::HalfOpen => {
                warn!("Half-open probe failed, circuit re-tripped");
                *state = State::Open { tripped_at: now };
            }
            State::Open { .. } => {}
        }
    }

    /// Human-readable state, for diagnostics
    pub fn state_name(&self) -> &'static str {
        match self.state.lock() {
            Ok(state) => match &*state {
                State::Closed { .. } => "closed",
                State::Open { .. } => "open",
                State::HalfOpen => "half-open",
            },
            Err(_) => "unknown",
        }
    }

    #[cfg(test)]
    fn force_open(&self, tripped_at: Instant) {
        *self.state.lock().unwrap() = State::Open { tripped_at };
    }

    #[cfg(test)]
    fn force_half_open(&self) {
        *self.state.lock().unwrap() = State::HalfOpen;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_new_breaker_is_available() {
        assert!(breaker().is_available());
        assert_eq!(breaker().state_name(), "closed");
    }

    #[test]
    fn test_single_failure_does_not_trip() {
        let cb = breaker();
        cb.record_failure();
        assert!(cb.is_available());
    }

    #[test]
    fn test_threshold_failures_trips_circuit() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(!cb.is_available());
        assert_eq!(cb.state_name(), "open");
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        // Counter reset: two more failures should not trip a threshold of 3
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_available());
    }

    #[test]
    fn test_open_transitions_to_half_open_after_cooldown() {
        let cb = breaker();
        cb.force_open(Instant::now() - Duration::from_secs(61));

        // First caller gets the probe slot
        assert!(cb.is_available());
        assert_eq!(cb.state_name(), "half-open");
        // Second caller is blocked while the probe is in flight
        assert!(!cb.is_available());
    }

    #[test]
    fn test_half_open_success_closes_circuit() {
        let cb = breaker();
        cb.force_half_open();
        cb.record_success();
        assert!(cb.is_available());
        assert_eq!(cb.state_name(), "closed");
    }

    #[test]
    fn test_half_open_failure_retrips_circuit() {
        let cb = breaker();
        cb.force_half_open();
        cb.record_failure();
        assert!(!cb.is_available());
        assert_eq!(cb.state_name(), "open");
    }

    #[test]
    fn test_open_rejects_before_cooldown() {
        let cb = breaker();
        cb.force_open(Instant::now());
        assert!(!cb.is_available());
    }
}
