//! Per-proxy circuit breaker with rolling-window failure accounting.
//!
//! Unlike a closure-wrapping breaker, this one is asked for admission before
//! a proxy is selected (`should_admit`) and told the outcome after the call
//! completes (`record_success` / `record_failure`), since proxy selection
//! happens before the request is issued, not around it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Breaker state as observed externally (for the control interface).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for BreakerState {
    fn from(value: u8) -> Self {
        match value {
            STATE_OPEN => BreakerState::Open,
            STATE_HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within `window` before the breaker trips OPEN.
    pub failure_threshold: usize,
    /// Width of the rolling window over which failures are counted.
    pub window: Duration,
    /// How long the breaker stays OPEN before admitting a single HALF_OPEN trial.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// A single proxy's circuit breaker.
///
/// `should_admit` is cheap and lock-free in the common CLOSED case; the
/// failure deque is only touched under a mutex when recording or pruning.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    open_until_millis: AtomicU64,
    half_open_in_flight: AtomicU8,
    failures: Mutex<VecDeque<u64>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: AtomicU8::new(STATE_CLOSED),
            open_until_millis: AtomicU64::new(0),
            half_open_in_flight: AtomicU8::new(0),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn state(&self) -> BreakerState {
        BreakerState::from(self.state.load(Ordering::SeqCst))
    }

    /// Read-only peek used by strategies to filter candidates: does this
    /// breaker currently look open? Does not perform the OPEN->HALF_OPEN
    /// transition, so it's safe to call repeatedly within one selection pass
    /// without consuming the single HALF_OPEN trial slot. The actual
    /// reservation happens in `should_admit`, called once by the retry
    /// executor against the proxy it ends up choosing.
    pub fn is_open_now(&self) -> bool {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => self.clock.now_millis() < self.open_until_millis.load(Ordering::SeqCst),
            STATE_HALF_OPEN => true,
            _ => false,
        }
    }

    /// Ask whether a call may be attempted right now. Exactly one caller is
    /// admitted as the HALF_OPEN trial; concurrent callers during that trial
    /// see it as still blocking.
    pub fn should_admit(&self) -> bool {
        match self.state.load(Ordering::SeqCst) {
            STATE_CLOSED => true,
            STATE_HALF_OPEN => false,
            _ /* OPEN */ => {
                let now = self.clock.now_millis();
                if now < self.open_until_millis.load(Ordering::SeqCst) {
                    return false;
                }
                // Recovery timeout elapsed: try to become the sole HALF_OPEN trial.
                match self.state.compare_exchange(
                    STATE_OPEN,
                    STATE_HALF_OPEN,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        self.half_open_in_flight.store(1, Ordering::SeqCst);
                        true
                    }
                    Err(_) => false,
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state.load(Ordering::SeqCst) {
            STATE_HALF_OPEN => {
                self.failures.lock().unwrap().clear();
                self.half_open_in_flight.store(0, Ordering::SeqCst);
                self.state.store(STATE_CLOSED, Ordering::SeqCst);
            }
            STATE_CLOSED => {
                self.prune(self.clock.now_millis());
            }
            _ => {}
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now_millis();
        match self.state.load(Ordering::SeqCst) {
            STATE_HALF_OPEN => {
                self.half_open_in_flight.store(0, Ordering::SeqCst);
                self.trip(now);
            }
            STATE_CLOSED => {
                let count = {
                    let mut failures = self.failures.lock().unwrap();
                    failures.push_back(now);
                    self.prune_locked(&mut failures, now);
                    failures.len()
                };
                if count >= self.config.failure_threshold {
                    self.trip(now);
                }
            }
            _ => {}
        }
    }

    /// Force the breaker back to CLOSED, discarding recorded failures.
    pub fn reset(&self) {
        self.failures.lock().unwrap().clear();
        self.half_open_in_flight.store(0, Ordering::SeqCst);
        self.open_until_millis.store(0, Ordering::SeqCst);
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    fn trip(&self, now: u64) {
        self.open_until_millis
            .store(now + self.config.open_timeout.as_millis() as u64, Ordering::SeqCst);
        self.state.store(STATE_OPEN, Ordering::SeqCst);
    }

    fn prune(&self, now: u64) {
        let mut failures = self.failures.lock().unwrap();
        self.prune_locked(&mut failures, now);
    }

    fn prune_locked(&self, failures: &mut VecDeque<u64>, now: u64) {
        let window_millis = self.config.window.as_millis() as u64;
        while let Some(&oldest) = failures.front() {
            if now.saturating_sub(oldest) > window_millis {
                failures.pop_front();
            } else {
                break;
            }
        }
    }
}
