// SPDX-License-Identifier: MIT OR Apache-2.0

//! The instrumented HTTP client.
//!
//! # Example
//!
//! ```no_run
//! use httpz::{HttpzClient, HttpzClientConfig, Request};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! # async fn demo() -> httpz::Result<()> {
//! let config = HttpzClientConfig::builder("user-client", "https://users.internal")
//!     .version("1.4.0")
//!     .path("getUser", "/users/{id}")
//!     .circuit_breaker_enabled(true)
//!     .build();
//! let client = HttpzClient::new(config)?;
//!
//! let response = client
//!     .execute::<User>(Request::get("getUser").path_param("id", "1").build())
//!     .await?;
//! if let Some(user) = response.result {
//!     println!("hello {}", user.name);
//! }
//! # Ok(())
//! # }
//! ```

mod paths;
mod pipeline;
mod request;
mod response;
mod transport;

pub use paths::PathRegistry;
pub use request::{parse_basic_auth, Auth, Request, RequestBuilder};
pub use response::{RawResponse, Response};

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::Tracer;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{HttpzError, Result};
use crate::runtime::stage::Chain;
use crate::runtime::{
    CircuitBreaker, CircuitBreakerConfig, LoggingConfig, LoggingStage, Masker, RetryConfig,
    TracingConfig, TracingConfigBuilder, TracingStage,
};
use pipeline::Pipeline;
use transport::Transport;

/// Everything needed to construct an [`HttpzClient`].
#[derive(Debug, Clone)]
pub struct HttpzClientConfig {
    /// Client name, used in the user-agent.
    pub name: String,
    /// Service version, used in the user-agent.
    pub version: String,
    pub base_url: String,
    /// Transport to send requests with. A default client is built when unset.
    pub http: Option<reqwest::Client>,
    /// Default per-request deadline.
    pub timeout: Option<Duration>,
    /// Headers sent with every request.
    pub headers: HeaderMap,
    pub paths: PathRegistry,
    pub logging: LoggingConfig,
    pub tracing: TracingConfig,
    /// Breaker parameters; `None` bypasses the gate.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub retry: RetryConfig,
}

impl HttpzClientConfig {
    /// Start a configuration for a client called `name` talking to `base_url`.
    #[must_use]
    pub fn builder(name: impl Into<String>, base_url: impl Into<String>) -> HttpzClientConfigBuilder {
        HttpzClientConfigBuilder::new(name, base_url)
    }
}

/// Builder for [`HttpzClientConfig`]. Every setter is optional.
pub struct HttpzClientConfigBuilder {
    name: String,
    version: String,
    base_url: String,
    http: Option<reqwest::Client>,
    timeout: Option<Duration>,
    headers: HeaderMap,
    paths: Vec<(String, String)>,
    logging: LoggingConfig,
    tracing: TracingConfigBuilder,
    circuit_breaker: CircuitBreakerConfig,
    circuit_breaker_enabled: bool,
    retry: RetryConfig,
}

impl HttpzClientConfigBuilder {
    fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            base_url: base_url.into(),
            http: None,
            timeout: None,
            headers: HeaderMap::new(),
            paths: Vec::new(),
            logging: LoggingConfig::default(),
            tracing: TracingConfig::builder(),
            circuit_breaker: CircuitBreakerConfig::default(),
            circuit_breaker_enabled: false,
            retry: RetryConfig::disabled(),
        }
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Send requests through an existing `reqwest` client.
    #[must_use]
    pub fn transport(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Register a named route template such as `/users/{id}`.
    #[must_use]
    pub fn path(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.paths.push((name.into(), template.into()));
        self
    }

    #[must_use]
    pub fn paths<I, K, V>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.paths
            .extend(paths.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Replace the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    #[must_use]
    pub fn log_enabled(mut self, enabled: bool) -> Self {
        self.logging.enabled = enabled;
        self
    }

    /// Masker applied to logged headers and bodies.
    #[must_use]
    pub fn masker(mut self, masker: impl Masker + 'static) -> Self {
        self.logging = self.logging.with_masker(masker);
        self
    }

    /// Create spans with `tracer` instead of the global provider's tracer.
    #[must_use]
    pub fn tracer<T>(mut self, tracer: T) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Send + Sync + 'static,
    {
        self.tracing = self.tracing.tracer(tracer);
        self
    }

    #[must_use]
    pub fn propagator<P>(mut self, propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        self.tracing = self.tracing.propagator(propagator);
        self
    }

    #[must_use]
    pub fn trace_enabled(mut self, enabled: bool) -> Self {
        self.tracing = self.tracing.enabled(enabled);
        self
    }

    /// Gate calls through a breaker with these parameters. Enables the gate.
    #[must_use]
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self.circuit_breaker_enabled = true;
        self
    }

    #[must_use]
    pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.circuit_breaker_enabled = enabled;
        self
    }

    /// Retry transport attempts. Retries are off unless set.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn build(self) -> HttpzClientConfig {
        HttpzClientConfig {
            name: self.name,
            version: self.version,
            base_url: self.base_url,
            http: self.http,
            timeout: self.timeout,
            headers: self.headers,
            paths: self.paths.into_iter().collect(),
            logging: self.logging,
            tracing: self.tracing.build(),
            circuit_breaker: self.circuit_breaker_enabled.then_some(self.circuit_breaker),
            retry: self.retry,
        }
    }
}

/// An HTTP client that resolves named routes and wraps every call in
/// logging, tracing and an optional circuit breaker.
///
/// Cloning is cheap; clones share routes, breaker state and the connection pool.
#[derive(Clone)]
pub struct HttpzClient {
    inner: Arc<Pipeline>,
}

impl HttpzClient {
    /// Build a client. Defaults are resolved once here.
    ///
    /// # Errors
    ///
    /// Returns `HttpzError::Config` for an invalid base URL or user-agent, and
    /// `HttpzError::Transport` if the default `reqwest` client cannot be built.
    pub fn new(config: HttpzClientConfig) -> Result<Self> {
        Url::parse(&config.base_url).map_err(|e| {
            HttpzError::Config(format!("invalid base URL {:?}: {e}", config.base_url))
        })?;

        let http = match config.http {
            Some(http) => http,
            None => reqwest::Client::builder().build()?,
        };

        let mut chain = Chain::new();
        if config.tracing.enabled {
            chain.push(Box::new(TracingStage::new(&config.tracing)));
        }
        if config.logging.enabled {
            chain.push(Box::new(LoggingStage::new(config.logging)));
        }

        let headers = pipeline::default_headers(config.headers, &config.name, &config.version)?;

        debug!(
            target: "httpz::client",
            name = %config.name,
            base_url = %config.base_url,
            routes = config.paths.len(),
            stages = ?chain.names(),
            circuit_breaker = config.circuit_breaker.is_some(),
            "client created"
        );

        Ok(Self {
            inner: Arc::new(Pipeline {
                name: config.name,
                version: config.version,
                base_url: config.base_url,
                paths: config.paths,
                headers,
                timeout: config.timeout,
                chain,
                breaker: config
                    .circuit_breaker
                    .map(|c| Arc::new(CircuitBreaker::new(c))),
                transport: Transport::new(http, config.retry),
            }),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The route template registered under `name`.
    #[must_use]
    pub fn path(&self, name: &str) -> Option<&str> {
        self.inner.paths.resolve(name)
    }

    #[must_use]
    pub fn paths(&self) -> &PathRegistry {
        &self.inner.paths
    }

    /// The breaker gating this client, if enabled.
    #[must_use]
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.inner.breaker.as_deref()
    }

    /// Send a request and return the raw response without decoding it.
    ///
    /// A 4xx/5xx status is returned as a response, not as an error.
    ///
    /// # Errors
    ///
    /// Returns `RouteNotFound`, `BreakerOpen`, `Transport`, `Validation` or
    /// `Encode` errors; see [`HttpzError`].
    pub async fn send(&self, request: Request) -> Result<RawResponse> {
        self.inner.run(request).await
    }

    /// Send a request and decode a success body as JSON into `T`.
    ///
    /// Error statuses are not decoded: `result` is `None` and the body is
    /// available through [`Response::error_as`].
    ///
    /// # Errors
    ///
    /// Everything [`HttpzClient::send`] returns, plus `HttpzError::Decode`
    /// carrying the raw response when the body does not match `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: Request) -> Result<Response<T>> {
        let raw = self.send(request).await?;
        Response::decode(raw)
    }
}

impl fmt::Debug for HttpzClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpzClient")
            .field("name", &self.inner.name)
            .field("base_url", &self.inner.base_url)
            .field("routes", &self.inner.paths.len())
            .field("stages", &self.inner.chain.names())
            .field("circuit_breaker", &self.inner.breaker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
