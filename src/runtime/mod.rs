// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime utilities for resilience and observability.
//!
//! This module provides the pieces the client wraps around every call:
//! structured logging with masking, OpenTelemetry span propagation, a circuit
//! breaker and transport retries.

mod circuit_breaker;
mod logging;
mod masking;
mod retry;
pub(crate) mod stage;
mod tracing;

pub use circuit_breaker::{
    BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState, FailurePolicy,
};
pub use logging::{LogLevel, LoggingConfig, MarshalFailure, HTTP_TARGET};
pub use masking::{KeyMasker, Masker, REDACTED};
pub use retry::{
    AttemptOutcome, BackoffStrategy, Classify, CustomRetryPolicy, DefaultRetryPolicy,
    ExponentialBackoff, FixedBackoff, NoBackoff, NoRetryPolicy, RetryConfig, RetryConfigBuilder,
    RetryPolicy,
};
pub use self::tracing::{TracingConfig, TracingConfigBuilder, TRACER_NAME};

pub(crate) use self::logging::LoggingStage;
pub(crate) use self::tracing::TracingStage;
