// SPDX-License-Identifier: MIT OR Apache-2.0

//! # httpz
//!
//! An async HTTP client for service-to-service calls. Requests name a route
//! registered on the client instead of a URL, and every call is wrapped in
//! masked request/response logging, an OpenTelemetry client span with
//! `traceparent` propagation, and an optional circuit breaker.
//!
//! ```no_run
//! use httpz::{HttpzClient, HttpzClientConfig, Request};
//!
//! # async fn demo() -> httpz::Result<()> {
//! let client = HttpzClient::new(
//!     HttpzClientConfig::builder("orders", "https://orders.internal")
//!         .version("2.1.0")
//!         .path("listOrders", "/customers/{customer}/orders")
//!         .build(),
//! )?;
//!
//! let raw = client
//!     .send(
//!         Request::get("listOrders")
//!             .path_param("customer", "42")
//!             .query_param("limit", "10")
//!             .build(),
//!     )
//!     .await?;
//! println!("{} in {:?}", raw.status(), raw.duration());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod runtime;
pub mod testkit;

pub use client::{
    parse_basic_auth, Auth, HttpzClient, HttpzClientConfig, HttpzClientConfigBuilder, PathRegistry,
    RawResponse, Request, RequestBuilder, Response,
};
pub use error::{HttpzError, Result};
