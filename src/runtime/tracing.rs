// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenTelemetry tracing stage for outbound HTTP calls.
//!
//! # Overview
//!
//! For every call whose context already carries a valid span, the stage:
//! - starts a client-kind child span named `"<METHOD> <URL>"`
//! - injects the child's trace context into the outgoing headers
//! - closes the span once the call returns, recording status and duration
//!
//! Calls without a parent span are left alone: this client extends existing
//! traces and never starts a root span of its own.
//!
//! # Span lifecycle
//!
//! ```text
//! Idle --before (valid parent)--> Active --after--> Ended
//! ```
//!
//! The active span is owned by a guard. If the guard is dropped while still
//! active (a panic unwinding through the call, or the call's future being
//! dropped), the span is closed with an error status from `Drop`, so it ends
//! exactly once on every path.
//!
//! # Semantic Conventions
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `url.full` | Resolved request URL |
//! | `http.request.method` | HTTP method |
//! | `httpz.route` | Registered route name |
//! | `http.response.status_code` | Response status |
//! | `http.client.request.duration` | Transport time in milliseconds |
//!
//! # Example
//!
//! ```rust,ignore
//! use httpz::runtime::TracingConfig;
//! use opentelemetry::trace::TracerProvider as _;
//!
//! let provider = opentelemetry_sdk::trace::TracerProvider::builder().build();
//! let tracing = TracingConfig::builder()
//!     .enabled(true)
//!     .tracer(provider.tracer("my-service"))
//!     .build();
//! ```

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::propagation::{Injector, TextMapPropagator};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::client::RawResponse;
use crate::error::{HttpzError, Result};
use crate::runtime::stage::{Call, Correlation, Outcome, Stage};

/// Instrumentation scope name of the default tracer.
pub const TRACER_NAME: &str = "httpz-tracer-middleware";

pub(crate) const URL_FULL: &str = "url.full";
pub(crate) const HTTP_REQUEST_METHOD: &str = "http.request.method";
const HTTPZ_ROUTE: &str = "httpz.route";
pub(crate) const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";
pub(crate) const HTTP_CLIENT_REQUEST_DURATION: &str = "http.client.request.duration";
const ERROR_TYPE: &str = "error.type";

/// Configuration for the tracing stage.
#[derive(Clone)]
pub struct TracingConfig {
    /// Whether spans are created at all.
    pub enabled: bool,
    tracer: Arc<BoxedTracer>,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfigBuilder::default().build()
    }
}

impl fmt::Debug for TracingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingConfig")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl TracingConfig {
    /// Create a new builder for `TracingConfig`.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// A disabled configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self::builder().enabled(false).build()
    }
}

/// Builder for `TracingConfig`.
#[derive(Default)]
pub struct TracingConfigBuilder {
    enabled: Option<bool>,
    tracer: Option<BoxedTracer>,
    propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
}

impl TracingConfigBuilder {
    /// Enable or disable span creation (default: enabled).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Use a specific tracer instead of the global provider's.
    pub fn tracer<T>(mut self, tracer: T) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Send + Sync + 'static,
    {
        self.tracer = Some(BoxedTracer::new(Box::new(tracer)));
        self
    }

    /// Use a specific propagator (default: W3C trace context).
    pub fn propagator<P>(mut self, propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        self.propagator = Some(Arc::new(propagator));
        self
    }

    /// Build the `TracingConfig`, resolving defaults once.
    pub fn build(self) -> TracingConfig {
        TracingConfig {
            enabled: self.enabled.unwrap_or(true),
            tracer: Arc::new(self.tracer.unwrap_or_else(|| global::tracer(TRACER_NAME))),
            propagator: self
                .propagator
                .unwrap_or_else(|| Arc::new(TraceContextPropagator::new())),
        }
    }
}

/// Span ownership for one call.
#[derive(Default)]
pub(crate) enum SpanState {
    /// No span was started.
    #[default]
    Idle,
    Active(SpanGuard),
    Ended,
}

impl SpanState {
    /// Take the active guard, leaving `Ended` behind. Idle stays idle.
    fn take_active(&mut self) -> Option<SpanGuard> {
        match std::mem::take(self) {
            SpanState::Active(guard) => {
                *self = SpanState::Ended;
                Some(guard)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        matches!(self, SpanState::Active(_))
    }
}

/// Owns the context holding an active span and ends that span exactly once.
pub(crate) struct SpanGuard {
    cx: Context,
    url: String,
    method: String,
    ended: bool,
}

impl SpanGuard {
    fn new(cx: Context, url: String, method: String) -> Self {
        Self {
            cx,
            url,
            method,
            ended: false,
        }
    }

    fn end_with_response(mut self, response: &RawResponse) {
        let span = self.cx.span();
        span.set_attribute(KeyValue::new(
            HTTP_CLIENT_REQUEST_DURATION,
            response.duration().as_millis() as i64,
        ));
        span.set_attribute(KeyValue::new(
            HTTP_RESPONSE_STATUS_CODE,
            i64::from(response.status().as_u16()),
        ));
        if response.is_error() {
            span.set_status(Status::error(response.status().to_string()));
        } else {
            span.set_status(Status::Ok);
        }
        span.end();
        self.ended = true;
    }

    fn end_with_error(mut self, error: &HttpzError) {
        let span = self.cx.span();
        span.set_attribute(KeyValue::new(URL_FULL, self.url.clone()));
        span.set_attribute(KeyValue::new(HTTP_REQUEST_METHOD, self.method.clone()));
        span.set_attribute(KeyValue::new(ERROR_TYPE, error_type(error)));
        span.record_error(error);
        span.set_status(Status::error(error.to_string()));
        span.end();
        self.ended = true;
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        let reason = if std::thread::panicking() {
            "panicked"
        } else {
            "cancelled"
        };
        let span = self.cx.span();
        span.set_attribute(KeyValue::new(URL_FULL, self.url.clone()));
        span.set_attribute(KeyValue::new(HTTP_REQUEST_METHOD, self.method.clone()));
        span.set_attribute(KeyValue::new(ERROR_TYPE, reason));
        span.add_event(
            "exception",
            vec![KeyValue::new("exception.message", format!("request {reason}"))],
        );
        span.set_status(Status::error(format!("request {reason}")));
        span.end();
    }
}

fn error_type(error: &HttpzError) -> &'static str {
    match error {
        HttpzError::RouteNotFound(_) => "route_not_found",
        HttpzError::BreakerOpen(_) => "breaker_open",
        HttpzError::Transport(e) if e.is_timeout() => "timeout",
        HttpzError::Transport(e) if e.is_connect() => "connect",
        HttpzError::Transport(_) => "transport",
        HttpzError::Cancelled => "cancelled",
        HttpzError::Decode { .. } => "decode",
        HttpzError::Encode(_) => "encode",
        HttpzError::Config(_) => "config",
        HttpzError::Validation(_) => "validation",
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// Starts, propagates and closes the client span of a call.
pub(crate) struct TracingStage {
    tracer: Arc<BoxedTracer>,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl TracingStage {
    pub fn new(config: &TracingConfig) -> Self {
        Self {
            tracer: config.tracer.clone(),
            propagator: config.propagator.clone(),
        }
    }
}

impl Stage for TracingStage {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn before(&self, call: &mut Call) -> Result<()> {
        let parent = call.cx.span().span_context().clone();
        if !parent.is_valid() {
            return Ok(());
        }

        let url = call.url.to_string();
        let method = call.method.to_string();
        let span = self
            .tracer
            .span_builder(format!("{method} {url}"))
            .with_kind(SpanKind::Client)
            .with_start_time(SystemTime::now())
            .with_attributes(vec![
                KeyValue::new(URL_FULL, url.clone()),
                KeyValue::new(HTTP_REQUEST_METHOD, method.clone()),
                KeyValue::new(HTTPZ_ROUTE, call.route.clone()),
            ])
            .start_with_context(self.tracer.as_ref(), &call.cx);

        let cx = call.cx.with_span(span);
        let child = cx.span().span_context().clone();
        call.correlation = Some(Correlation {
            trace_id: child.trace_id().to_string(),
            span_id: child.span_id().to_string(),
            parent_span_id: parent.span_id().to_string(),
        });

        self.propagator
            .inject_context(&cx, &mut HeaderInjector(&mut call.headers));

        call.cx = cx.clone();
        call.span = SpanState::Active(SpanGuard::new(cx, url, method));
        Ok(())
    }

    fn after(&self, call: &mut Call, outcome: Outcome<'_>) {
        let Some(guard) = call.span.take_active() else {
            return;
        };
        match outcome {
            Outcome::Response(response) => guard.end_with_response(response),
            Outcome::Failed(error) => guard.end_with_error(error),
        }
    }
}
