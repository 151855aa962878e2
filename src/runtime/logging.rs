// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured logging of outbound requests and their responses.
//!
//! Every call that reaches the logging stage produces exactly two records on
//! the `httpz::http` target: one before the request is sent and one after the
//! response (or transport error) comes back. Both carry the route name as
//! `httpz.route`. Headers and JSON bodies pass through a [`Masker`] first.
//!
//! # Example
//!
//! ```
//! use httpz::runtime::{KeyMasker, LogLevel, LoggingConfig, MarshalFailure};
//!
//! let config = LoggingConfig::new()
//!     .with_success_level(LogLevel::Debug)
//!     .with_marshal_failure(MarshalFailure::Abort)
//!     .with_masker(KeyMasker::new().with_sensitive_field("ssn"));
//!
//! assert_eq!(config.error_level, LogLevel::Error);
//! ```

use bytes::Bytes;
use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{HttpzError, Result};
use crate::runtime::masking::{KeyMasker, Masker};
use crate::runtime::stage::{Call, Outcome, Stage};

/// Target of request/response records.
pub const HTTP_TARGET: &str = "httpz::http";

const REQUEST_MESSAGE: &str = "[HTTPZ][OUTGOING REQUEST] success";
const RESPONSE_SUCCESS_MESSAGE: &str = "[HTTPZ][INCOMING RESPONSE] success";
const RESPONSE_ERROR_MESSAGE: &str = "[HTTPZ][INCOMING RESPONSE] error";

/// Log level for the logging stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level - most verbose.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warn level.
    Warn,
    /// Error level - only errors.
    Error,
    /// Disabled - no logging.
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Off => write!(f, "OFF"),
        }
    }
}

/// What to do when a request body cannot be decoded as JSON for masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarshalFailure {
    /// Log the body as lossy UTF-8 text and note the failure on the record.
    #[default]
    Degrade,
    /// Fail the call with `HttpzError::Encode` before it is sent.
    Abort,
}

/// Configuration for the logging stage.
#[derive(Clone)]
pub struct LoggingConfig {
    /// Whether the stage is installed at all.
    pub enabled: bool,
    /// Level of the pre-send record.
    pub request_level: LogLevel,
    /// Level of the post-receive record for statuses below 400.
    pub success_level: LogLevel,
    /// Level of the post-receive record for error statuses and transport errors.
    pub error_level: LogLevel,
    pub marshal_failure: MarshalFailure,
    masker: Arc<dyn Masker>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_level: LogLevel::Info,
            success_level: LogLevel::Info,
            error_level: LogLevel::Error,
            marshal_failure: MarshalFailure::Degrade,
            masker: Arc::new(KeyMasker::default()),
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("enabled", &self.enabled)
            .field("request_level", &self.request_level)
            .field("success_level", &self.success_level)
            .field("error_level", &self.error_level)
            .field("marshal_failure", &self.marshal_failure)
            .finish_non_exhaustive()
    }
}

impl LoggingConfig {
    /// Create a new logging configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration that installs no logging stage.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the level of the pre-send record.
    #[must_use]
    pub fn with_request_level(mut self, level: LogLevel) -> Self {
        self.request_level = level;
        self
    }

    /// Set the success log level.
    #[must_use]
    pub fn with_success_level(mut self, level: LogLevel) -> Self {
        self.success_level = level;
        self
    }

    /// Set the error log level.
    #[must_use]
    pub fn with_error_level(mut self, level: LogLevel) -> Self {
        self.error_level = level;
        self
    }

    #[must_use]
    pub fn with_marshal_failure(mut self, policy: MarshalFailure) -> Self {
        self.marshal_failure = policy;
        self
    }

    /// Replace the masker applied to headers and bodies.
    #[must_use]
    pub fn with_masker(mut self, masker: impl Masker + 'static) -> Self {
        self.masker = Arc::new(masker);
        self
    }

    /// Create a verbose configuration for debugging.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            request_level: LogLevel::Debug,
            success_level: LogLevel::Debug,
            ..Self::default()
        }
    }

    /// Create a quiet configuration for production: only failures are logged.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            request_level: LogLevel::Off,
            success_level: LogLevel::Off,
            error_level: LogLevel::Warn,
            ..Self::default()
        }
    }
}

macro_rules! emit {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => ::tracing::event!(target: HTTP_TARGET, ::tracing::Level::TRACE, $($arg)+),
            LogLevel::Debug => ::tracing::event!(target: HTTP_TARGET, ::tracing::Level::DEBUG, $($arg)+),
            LogLevel::Info => ::tracing::event!(target: HTTP_TARGET, ::tracing::Level::INFO, $($arg)+),
            LogLevel::Warn => ::tracing::event!(target: HTTP_TARGET, ::tracing::Level::WARN, $($arg)+),
            LogLevel::Error => ::tracing::event!(target: HTTP_TARGET, ::tracing::Level::ERROR, $($arg)+),
            LogLevel::Off => {}
        }
    };
}

/// A body rendered for a log record.
struct RenderedBody {
    text: String,
    error: Option<String>,
}

/// Emits the request/response record pair of a call.
pub(crate) struct LoggingStage {
    config: LoggingConfig,
}

impl LoggingStage {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    fn headers(&self, headers: &HeaderMap) -> String {
        self.config.masker.mask_headers(headers).to_string()
    }

    fn render(&self, body: Option<&Bytes>) -> std::result::Result<RenderedBody, serde_json::Error> {
        let Some(bytes) = body.filter(|b| !b.is_empty()) else {
            return Ok(RenderedBody {
                text: String::new(),
                error: None,
            });
        };
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(RenderedBody {
            text: self.config.masker.mask_body(&value).to_string(),
            error: None,
        })
    }

    fn degrade(body: Option<&Bytes>, error: &serde_json::Error) -> RenderedBody {
        RenderedBody {
            text: body
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
            error: Some(error.to_string()),
        }
    }
}

impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn before(&self, call: &mut Call) -> Result<()> {
        let (body, aborted) = match self.render(call.body.as_ref()) {
            Ok(body) => (body, None),
            Err(e) => {
                let body = Self::degrade(call.body.as_ref(), &e);
                match self.config.marshal_failure {
                    MarshalFailure::Degrade => (body, None),
                    MarshalFailure::Abort => (
                        RenderedBody {
                            text: String::new(),
                            error: body.error,
                        },
                        Some(e),
                    ),
                }
            }
        };

        let correlation = call.correlation.as_ref();
        emit!(
            self.config.request_level,
            url.full = %call.url,
            httpz.route = %call.route,
            http.request.method = %call.method,
            http.request.header = %self.headers(&call.headers),
            http.request.body = %body.text,
            http.request.body.error = body.error.as_deref(),
            trace_id = correlation.map(|c| c.trace_id.as_str()),
            span_id = correlation.map(|c| c.span_id.as_str()),
            parent_span_id = correlation.map(|c| c.parent_span_id.as_str()),
            "{}",
            REQUEST_MESSAGE
        );

        match aborted {
            Some(e) => Err(HttpzError::Encode(e)),
            None => Ok(()),
        }
    }

    fn after(&self, call: &mut Call, outcome: Outcome<'_>) {
        let correlation = call.correlation.as_ref();
        let trace_id = correlation.map(|c| c.trace_id.as_str());
        let span_id = correlation.map(|c| c.span_id.as_str());
        let parent_span_id = correlation.map(|c| c.parent_span_id.as_str());

        match outcome {
            Outcome::Response(response) => {
                let body = self
                    .render(Some(response.body()))
                    .unwrap_or_else(|e| Self::degrade(Some(response.body()), &e));
                let (level, message) = if response.is_error() {
                    (self.config.error_level, RESPONSE_ERROR_MESSAGE)
                } else {
                    (self.config.success_level, RESPONSE_SUCCESS_MESSAGE)
                };
                emit!(
                    level,
                    url.full = %call.url,
                    httpz.route = %call.route,
                    http.request.method = %call.method,
                    http.client.request.duration = response.duration().as_millis() as u64,
                    http.response.status_code = response.status().as_u16(),
                    http.response.header = %self.headers(response.headers()),
                    http.response.body = %body.text,
                    http.response.body.error = body.error.as_deref(),
                    trace_id,
                    span_id,
                    parent_span_id,
                    "{}",
                    message
                );
            }
            Outcome::Failed(error) => {
                emit!(
                    self.config.error_level,
                    url.full = %call.url,
                    httpz.route = %call.route,
                    http.request.method = %call.method,
                    http.client.request.duration = call.elapsed.as_millis() as u64,
                    error = %error,
                    trace_id,
                    span_id,
                    parent_span_id,
                    "{}",
                    RESPONSE_ERROR_MESSAGE
                );
            }
        }
    }
}
