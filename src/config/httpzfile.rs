// SPDX-License-Identifier: MIT OR Apache-2.0

//! YAML client configuration file
//!
//! # Example
//!
//! ```
//! use httpz::config::HttpzFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = HttpzFile::from_yaml(
//!     r#"
//! name: user-client
//! base_url: https://users.internal
//! paths:
//!   getUser: /users/{id}
//! circuit_breaker:
//!   failure_threshold: 5
//! "#,
//! )?;
//!
//! let config = file.into_builder()?.build();
//! assert_eq!(config.paths.resolve("getUser"), Some("/users/{id}"));
//! assert!(config.circuit_breaker.is_some());
//! # Ok(())
//! # }
//! ```

use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::client::{HttpzClientConfig, HttpzClientConfigBuilder};
use crate::error::{HttpzError, Result};
use crate::runtime::{
    CircuitBreakerConfig, CustomRetryPolicy, ExponentialBackoff, FixedBackoff, LogLevel,
    LoggingConfig, MarshalFailure, RetryConfig,
};

/// Path to the configuration file.
pub const ENV_HTTPZ_CONFIG: &str = "HTTPZ_CONFIG";
/// Overrides `base_url`.
pub const ENV_HTTPZ_BASE_URL: &str = "HTTPZ_BASE_URL";
/// Overrides `logging.enabled`.
pub const ENV_HTTPZ_LOG_ENABLED: &str = "HTTPZ_LOG_ENABLED";
/// Overrides `tracing.enabled`.
pub const ENV_HTTPZ_TRACE_ENABLED: &str = "HTTPZ_TRACE_ENABLED";

/// A client configuration as written in YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HttpzFile {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub version: String,
    /// Default per-request deadline in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Route name to path template.
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub tracing: TracingSection,
    /// Present to enable the breaker.
    #[serde(default)]
    pub circuit_breaker: Option<BreakerSection>,
    /// Present to enable retries.
    #[serde(default)]
    pub retry: Option<RetrySection>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub enabled: bool,
    pub request_level: LogLevel,
    pub success_level: LogLevel,
    pub error_level: LogLevel,
    pub marshal_failure: MarshalFailure,
}

impl Default for LoggingSection {
    fn default() -> Self {
        let defaults = LoggingConfig::default();
        Self {
            enabled: defaults.enabled,
            request_level: defaults.request_level,
            success_level: defaults.success_level,
            error_level: defaults.error_level,
            marshal_failure: defaults.marshal_failure,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TracingSection {
    pub enabled: bool,
}

impl Default for TracingSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Breaker parameters. Missing or zero values use the breaker defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSection {
    pub timeout_ms: Option<u64>,
    pub failure_threshold: Option<usize>,
    pub success_threshold: Option<usize>,
    pub half_open_max_requests: Option<usize>,
}

/// Retry parameters.
///
/// `backoff_ms` alone gives a fixed delay; adding `max_backoff_ms` makes the
/// delay grow exponentially up to that cap.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_retries: u32,
    pub backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    /// Retry these statuses instead of 502/503/504.
    pub statuses: Option<Vec<u16>>,
}

impl HttpzFile {
    /// Load the file named by `$HTTPZ_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns `HttpzError::Config` if the variable is unset, or the file
    /// cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_HTTPZ_CONFIG).map_err(|_| {
            HttpzError::Config(format!("{ENV_HTTPZ_CONFIG} is not set"))
        })?;
        Self::load_from_path(path)
    }

    /// Load `$HTTPZ_CONFIG` and apply the environment overrides.
    ///
    /// # Errors
    ///
    /// As [`HttpzFile::load_default`], plus an error for an override flag that
    /// is not a boolean.
    #[allow(clippy::result_large_err)]
    pub fn load_with_env() -> Result<Self> {
        let mut file = Self::load_default()?;
        file.apply_env(|key| std::env::var(key).ok())?;
        Ok(file)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed YAML.
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            HttpzError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| HttpzError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Apply overrides read through `lookup`.
    #[allow(clippy::result_large_err)]
    pub(crate) fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_HTTPZ_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(value) = lookup(ENV_HTTPZ_LOG_ENABLED) {
            self.logging.enabled = parse_flag(ENV_HTTPZ_LOG_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_HTTPZ_TRACE_ENABLED) {
            self.tracing.enabled = parse_flag(ENV_HTTPZ_TRACE_ENABLED, &value)?;
        }
        Ok(())
    }

    /// Convert into a client configuration builder. Programmatic settings
    /// such as a tracer or masker can be added before `build`.
    ///
    /// # Errors
    ///
    /// Returns `HttpzError::Config` for an invalid header or retry status.
    #[allow(clippy::result_large_err)]
    pub fn into_builder(self) -> Result<HttpzClientConfigBuilder> {
        let mut builder = HttpzClientConfig::builder(self.name, self.base_url)
            .version(self.version)
            .paths(self.paths)
            .logging(
                LoggingConfig::new()
                    .with_enabled(self.logging.enabled)
                    .with_request_level(self.logging.request_level)
                    .with_success_level(self.logging.success_level)
                    .with_error_level(self.logging.error_level)
                    .with_marshal_failure(self.logging.marshal_failure),
            )
            .trace_enabled(self.tracing.enabled);

        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HttpzError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HttpzError::Config(format!("invalid value for header {name}: {e}")))?;
            builder = builder.header(name, value);
        }

        if let Some(breaker) = self.circuit_breaker {
            builder = builder.circuit_breaker(breaker.into_config());
        }
        if let Some(retry) = self.retry {
            builder = builder.retry(retry.into_config()?);
        }

        Ok(builder)
    }
}

impl BreakerSection {
    fn into_config(self) -> CircuitBreakerConfig {
        let mut config = CircuitBreakerConfig::new();
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(n) = self.failure_threshold {
            config = config.with_failure_threshold(n);
        }
        if let Some(n) = self.success_threshold {
            config = config.with_success_threshold(n);
        }
        if let Some(n) = self.half_open_max_requests {
            config = config.with_half_open_max_requests(n);
        }
        config
    }
}

impl RetrySection {
    #[allow(clippy::result_large_err)]
    fn into_config(self) -> Result<RetryConfig> {
        let mut builder = RetryConfig::builder().max_retries(self.max_retries);

        let initial = Duration::from_millis(self.backoff_ms.unwrap_or(100));
        builder = match self.max_backoff_ms {
            Some(max) => builder.backoff(
                ExponentialBackoff::new(initial).with_max_delay(Duration::from_millis(max)),
            ),
            None => builder.backoff(FixedBackoff::new(initial)),
        };

        if let Some(statuses) = self.statuses {
            let statuses = statuses
                .into_iter()
                .map(|code| {
                    StatusCode::from_u16(code).map_err(|_| {
                        HttpzError::Config(format!("invalid retry status {code}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            builder = builder.policy(CustomRetryPolicy::new(statuses).with_connect_errors(true));
        }

        Ok(builder.build())
    }
}

#[allow(clippy::result_large_err)]
fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HttpzError::Config(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}
