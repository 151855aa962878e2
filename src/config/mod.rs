// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration files for httpz clients
//!
//! A client can be described in a YAML file and turned into a
//! [`HttpzClientConfigBuilder`](crate::HttpzClientConfigBuilder).
//!
//! # Environment Variables
//!
//! The following environment variables are supported:
//!
//! - `HTTPZ_CONFIG` - Path to the configuration file
//! - `HTTPZ_BASE_URL` - Override the base URL
//! - `HTTPZ_LOG_ENABLED` - Override whether request logging is installed
//! - `HTTPZ_TRACE_ENABLED` - Override whether tracing is installed
//!
//! # Example
//!
//! ```no_run
//! use httpz::config::HttpzFile;
//! use httpz::HttpzClient;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load $HTTPZ_CONFIG with environment variable overrides
//! let file = HttpzFile::load_with_env()?;
//! let client = HttpzClient::new(file.into_builder()?.build())?;
//! println!("routes: {}", client.paths().len());
//! # Ok(())
//! # }
//! ```

mod httpzfile;

pub use httpzfile::{
    BreakerSection, HttpzFile, LoggingSection, RetrySection, TracingSection, ENV_HTTPZ_BASE_URL,
    ENV_HTTPZ_CONFIG, ENV_HTTPZ_LOG_ENABLED, ENV_HTTPZ_TRACE_ENABLED,
};
