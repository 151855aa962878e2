// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry policies and backoff strategies for transport attempts.
//!
//! Retries happen beneath the request pipeline: however many attempts are
//! made, a call still produces one log pair and one span.
//!
//! # Example
//!
//! ```
//! use httpz::runtime::{ExponentialBackoff, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::builder()
//!     .max_retries(3)
//!     .backoff(ExponentialBackoff::new(Duration::from_millis(100)))
//!     .build();
//! assert_eq!(retry.max_retries, 3);
//! ```

use http::StatusCode;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::client::RawResponse;
use crate::error::HttpzError;

const RETRY_TARGET: &str = "httpz::retry";

/// How long to wait between transport attempts.
pub trait BackoffStrategy: Debug + Send + Sync + 'static {
    /// Wait before retry number `attempt + 1`; `attempt` counts from zero.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Retry immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// The same wait before every retry.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl BackoffStrategy for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Waits `initial_delay * multiplier^attempt`, capped at `max_delay`, with up
/// to 25% jitter unless disabled.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let total = if self.jitter {
            // Up to 25%, deterministic per attempt
            capped + (f64::from(attempt) * 0.1).sin().abs() * capped * 0.25
        } else {
            capped
        };

        Duration::from_millis(total as u64)
    }
}

/// How a single transport attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A response arrived with this status.
    Status(StatusCode),
    /// The connection could not be established.
    Connect,
    /// The attempt timed out.
    Timeout,
    /// Any other failure.
    Other,
}

/// Maps an attempt result to an [`AttemptOutcome`].
pub trait Classify {
    fn classify(&self) -> AttemptOutcome;
}

impl Classify for StatusCode {
    fn classify(&self) -> AttemptOutcome {
        AttemptOutcome::Status(*self)
    }
}

impl Classify for RawResponse {
    fn classify(&self) -> AttemptOutcome {
        AttemptOutcome::Status(self.status())
    }
}

impl Classify for reqwest::Error {
    fn classify(&self) -> AttemptOutcome {
        if self.is_timeout() {
            AttemptOutcome::Timeout
        } else if self.is_connect() {
            AttemptOutcome::Connect
        } else {
            AttemptOutcome::Other
        }
    }
}

impl Classify for HttpzError {
    fn classify(&self) -> AttemptOutcome {
        match self {
            HttpzError::Transport(e) => e.classify(),
            _ => AttemptOutcome::Other,
        }
    }
}

/// Determines whether an attempt should be retried.
pub trait RetryPolicy: Debug + Send + Sync + 'static {
    fn should_retry(&self, outcome: AttemptOutcome) -> bool;
}

/// Retries connect errors, timeouts and 502/503/504 responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, outcome: AttemptOutcome) -> bool {
        match outcome {
            AttemptOutcome::Connect | AttemptOutcome::Timeout => true,
            AttemptOutcome::Status(status) => matches!(
                status,
                StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            AttemptOutcome::Other => false,
        }
    }
}

/// Makes exactly one attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&self, _outcome: AttemptOutcome) -> bool {
        false
    }
}

/// Retries a chosen set of statuses, plus connect errors when enabled.
#[derive(Debug, Clone)]
pub struct CustomRetryPolicy {
    statuses: Vec<StatusCode>,
    connect_errors: bool,
}

impl CustomRetryPolicy {
    #[must_use]
    pub fn new(statuses: Vec<StatusCode>) -> Self {
        Self {
            statuses,
            connect_errors: false,
        }
    }

    /// Also retry attempts that failed to connect.
    #[must_use]
    pub fn with_connect_errors(mut self, retry: bool) -> Self {
        self.connect_errors = retry;
        self
    }
}

impl RetryPolicy for CustomRetryPolicy {
    fn should_retry(&self, outcome: AttemptOutcome) -> bool {
        match outcome {
            AttemptOutcome::Status(status) => self.statuses.contains(&status),
            AttemptOutcome::Connect => self.connect_errors,
            AttemptOutcome::Timeout | AttemptOutcome::Other => false,
        }
    }
}

/// Retry settings for the transport. Applied per attempt, beneath the stages.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first; zero disables retrying.
    pub max_retries: u32,
    pub policy: Arc<dyn RetryPolicy>,
    pub backoff: Arc<dyn BackoffStrategy>,
    /// No retry starts once this much time has passed since the first attempt.
    pub total_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfigBuilder::new().build()
    }
}

impl RetryConfig {
    /// Three retries with exponential backoff on the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Disable retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            policy: Arc::new(NoRetryPolicy),
            backoff: Arc::new(NoBackoff),
            total_timeout: None,
        }
    }

    /// Run `operation` until it yields an outcome the policy does not retry,
    /// retries are exhausted, or the total timeout has passed.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Classify,
        E: Classify,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let result = operation().await;
            let outcome = match &result {
                Ok(value) => value.classify(),
                Err(e) => e.classify(),
            };

            if attempt >= self.max_retries || !self.policy.should_retry(outcome) {
                return result;
            }
            if let Some(timeout) = self.total_timeout {
                if start.elapsed() >= timeout {
                    return result;
                }
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                target: RETRY_TARGET,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                outcome = ?outcome,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Builder for [`RetryConfig`], starting from its defaults.
#[derive(Debug, Clone)]
pub struct RetryConfigBuilder {
    max_retries: u32,
    policy: Arc<dyn RetryPolicy>,
    backoff: Arc<dyn BackoffStrategy>,
    total_timeout: Option<Duration>,
}

impl RetryConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            policy: Arc::new(DefaultRetryPolicy),
            backoff: Arc::new(ExponentialBackoff::default()),
            total_timeout: Some(Duration::from_secs(30)),
        }
    }

    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: impl RetryPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: impl BackoffStrategy) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Stop retrying after `timeout` in total.
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn no_total_timeout(mut self) -> Self {
        self.total_timeout = None;
        self
    }

    #[must_use]
    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            policy: self.policy,
            backoff: self.backoff,
            total_timeout: self.total_timeout,
        }
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
