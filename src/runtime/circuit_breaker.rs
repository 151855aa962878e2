// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker gating outbound calls.
//!
//! The breaker stops sending requests to an upstream that keeps failing and
//! lets it recover before traffic resumes.
//!
//! # States
//!
//! - **Closed**: calls go out and their outcomes are counted
//! - **Open**: calls are rejected before any I/O
//! - **Half-Open**: a few trial calls decide whether to close again
//!
//! A response is a failure when any failure policy says so (by default:
//! status 500 and above). Transport errors are always failures.
//!
//! # Example
//!
//! ```
//! use httpz::runtime::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> httpz::Result<()> {
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new()
//!         .with_failure_threshold(5)
//!         .with_timeout(Duration::from_secs(30))
//!         .with_failure_policy(|res| res.status().as_u16() == 429),
//! );
//!
//! let permit = breaker.try_acquire().await?;
//! // ... perform the call ...
//! permit.record_failure().await;
//! # Ok(())
//! # }
//! ```

use crate::client::RawResponse;
use crate::error::{HttpzError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const BREAKER_TARGET: &str = "httpz::breaker";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FAILURE_THRESHOLD: usize = 3;
const DEFAULT_SUCCESS_THRESHOLD: usize = 1;
const DEFAULT_HALF_OPEN_MAX_REQUESTS: usize = 1;

/// Decides whether a completed response counts as a breaker failure.
pub type FailurePolicy = Arc<dyn Fn(&RawResponse) -> bool + Send + Sync>;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass.
    Closed,
    /// Calls are rejected until the timeout elapses.
    Open,
    /// Trial calls are admitted up to `half_open_max_requests`.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker thresholds and failure policies.
///
/// Zero values are replaced by the defaults when the breaker is built.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: usize,
    /// Successes in half-open state before closing.
    pub success_threshold: usize,
    /// How long the circuit stays open before probing.
    pub timeout: Duration,
    /// Maximum concurrent trial requests in half-open state.
    pub half_open_max_requests: usize,
    failure_policies: Vec<FailurePolicy>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            half_open_max_requests: DEFAULT_HALF_OPEN_MAX_REQUESTS,
            failure_policies: Vec::new(),
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("timeout", &self.timeout)
            .field("half_open_max_requests", &self.half_open_max_requests)
            .field("failure_policies", &self.failure_policies.len())
            .finish()
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_half_open_max_requests(mut self, max: usize) -> Self {
        self.half_open_max_requests = max;
        self
    }

    /// Add a failure policy. With at least one policy installed, the default
    /// "status >= 500" rule no longer applies.
    #[must_use]
    pub fn with_failure_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&RawResponse) -> bool + Send + Sync + 'static,
    {
        self.failure_policies.push(Arc::new(policy));
        self
    }

    fn normalized(mut self) -> Self {
        if self.failure_threshold == 0 {
            self.failure_threshold = DEFAULT_FAILURE_THRESHOLD;
        }
        if self.success_threshold == 0 {
            self.success_threshold = DEFAULT_SUCCESS_THRESHOLD;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.half_open_max_requests == 0 {
            self.half_open_max_requests = DEFAULT_HALF_OPEN_MAX_REQUESTS;
        }
        self
    }

    /// Whether `response` counts as a failure.
    #[must_use]
    pub fn is_failure(&self, response: &RawResponse) -> bool {
        if self.failure_policies.is_empty() {
            return response.status().is_server_error();
        }
        self.failure_policies.iter().any(|policy| policy(response))
    }
}

/// Tracks call outcomes for one upstream and rejects calls while it is failing.
///
/// Callers take a [`BreakerPermit`] before each call and report the outcome
/// through it.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    success_count: AtomicUsize,
    half_open_requests: AtomicUsize,
    /// Bumped on every state transition; permits carry the value they were
    /// admitted under.
    generation: AtomicU64,
    opened_at: RwLock<Option<Instant>>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("failure_count", &self.failure_count())
            .field("total_calls", &self.total_calls())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Build a breaker; zero-valued settings fall back to the defaults.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: config.normalized(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            success_count: AtomicUsize::new(0),
            half_open_requests: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            opened_at: RwLock::new(None),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Current state. An open circuit whose timeout has elapsed moves to
    /// half-open here.
    pub async fn state(&self) -> CircuitState {
        let current_state = *self.state.read().await;
        if current_state == CircuitState::Open {
            let opened_at = *self.opened_at.read().await;
            if let Some(opened_at) = opened_at {
                if opened_at.elapsed() >= self.config.timeout {
                    let mut state = self.state.write().await;
                    if *state == CircuitState::Open {
                        *state = CircuitState::HalfOpen;
                        self.generation.fetch_add(1, Ordering::AcqRel);
                        self.half_open_requests.store(0, Ordering::Relaxed);
                        self.success_count.store(0, Ordering::Relaxed);
                        debug!(target: BREAKER_TARGET, state = %CircuitState::HalfOpen, "circuit breaker probing");
                    }
                    return *state;
                }
            }
        }
        current_state
    }

    /// Admit a call or reject it with `HttpzError::BreakerOpen`.
    ///
    /// # Errors
    ///
    /// Returns `HttpzError::BreakerOpen` while the circuit is open, or while
    /// half-open with all trial slots taken.
    pub async fn try_acquire(&self) -> Result<BreakerPermit<'_>> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        self.state().await;
        let (state, generation) = self.snapshot().await;
        match state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, false, generation)),
            CircuitState::Open => Err(self.reject().await),
            CircuitState::HalfOpen => {
                let max = self.config.half_open_max_requests;
                let admitted = self
                    .half_open_requests
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .is_ok();
                if admitted {
                    Ok(BreakerPermit::new(self, true, generation))
                } else {
                    Err(self.reject().await)
                }
            }
        }
    }

    async fn reject(&self) -> HttpzError {
        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        HttpzError::BreakerOpen(format!(
            "will retry after {:?}",
            self.time_until_retry().await.unwrap_or(Duration::ZERO)
        ))
    }

    /// State and generation read under the same lock.
    async fn snapshot(&self) -> (CircuitState, u64) {
        let state = self.state.read().await;
        (*state, self.generation.load(Ordering::Acquire))
    }

    /// State for an outcome admitted under `generation`, or `None` when the
    /// breaker has moved on since.
    async fn state_for(&self, generation: u64) -> Option<CircuitState> {
        let (state, current) = self.snapshot().await;
        (current == generation).then_some(state)
    }

    async fn on_success(&self, generation: u64) {
        let Some(state) = self.state_for(generation).await else {
            return;
        };
        match state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.config.success_threshold {
                    let mut state = self.state.write().await;
                    if self.generation.load(Ordering::Acquire) == generation {
                        *state = CircuitState::Closed;
                        self.generation.fetch_add(1, Ordering::AcqRel);
                        self.failure_count.store(0, Ordering::Relaxed);
                        self.success_count.store(0, Ordering::Relaxed);
                        info!(target: BREAKER_TARGET, state = %CircuitState::Closed, "circuit breaker closed");
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self, generation: u64) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let Some(state) = self.state_for(generation).await else {
            return;
        };
        match state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    self.open_circuit(generation, failures).await;
                }
            }
            CircuitState::HalfOpen => {
                // a failed trial reopens
                let failures = self.failure_count.load(Ordering::Relaxed);
                self.open_circuit(generation, failures).await;
            }
            CircuitState::Open => {}
        }
    }

    async fn open_circuit(&self, generation: u64, failures: usize) {
        let mut state = self.state.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        let from = *state;
        *state = CircuitState::Open;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.opened_at.write().await = Some(Instant::now());
        warn!(
            target: BREAKER_TARGET,
            from = %from,
            failures,
            retry_after_ms = self.config.timeout.as_millis() as u64,
            "circuit breaker opened"
        );
    }

    /// Force the circuit closed and clear the counters of the current window.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = CircuitState::Closed;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.half_open_requests.store(0, Ordering::Relaxed);
        *self.opened_at.write().await = None;
    }

    /// Remaining open time, or `None` when not open.
    pub async fn time_until_retry(&self) -> Option<Duration> {
        if *self.state.read().await != CircuitState::Open {
            return None;
        }

        self.opened_at
            .read()
            .await
            .map(|opened| self.config.timeout.saturating_sub(opened.elapsed()))
    }

    /// Consecutive failures counted in the closed state.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Calls turned away with `BreakerOpen`.
    #[must_use]
    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// `total_failures / total_calls`, or 0.0 before any call.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_calls.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let failures = self.total_failures.load(Ordering::Relaxed);
        failures as f64 / total as f64
    }

    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Admission to one call. Dropping it without recording an outcome releases
/// the slot without counting anything.
///
/// Outcomes only move the breaker while it is still in the state the permit
/// was admitted under. A call admitted while closed that finishes after the
/// circuit opened never counts as a half-open trial.
#[must_use = "record the call outcome through the permit"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    half_open: bool,
    generation: u64,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, half_open: bool, generation: u64) -> Self {
        Self {
            breaker,
            half_open,
            generation,
        }
    }

    /// Record a completed response, classified by the failure policies.
    pub async fn record(self, response: &RawResponse) {
        if self.breaker.config.is_failure(response) {
            self.breaker.on_failure(self.generation).await;
        } else {
            self.breaker.on_success(self.generation).await;
        }
    }

    /// Record a failure that produced no response.
    pub async fn record_failure(self) {
        self.breaker.on_failure(self.generation).await;
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        // slots are reset on entering half-open; older permits hold none
        let current = self.breaker.generation.load(Ordering::Acquire);
        if self.half_open && current == self.generation {
            let _ = self.breaker.half_open_requests.fetch_update(
                Ordering::AcqRel,
                Ordering::Acquire,
                |n| n.checked_sub(1),
            );
        }
    }
}
