// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::client::RawResponse;
use thiserror::Error;

#[allow(clippy::result_large_err)]
#[derive(Debug, Error)]
pub enum HttpzError {
    #[error("path \"{0}\" not found")]
    RouteNotFound(String),

    #[error("Circuit breaker is open: {0}")]
    BreakerOpen(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request cancelled before completion")]
    Cancelled,

    #[error("Decode error: {source} (status {})", .response.status())]
    Decode {
        #[source]
        source: serde_json::Error,
        response: Box<RawResponse>,
    },

    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl HttpzError {
    /// The call named a route missing from the registry.
    #[must_use]
    pub fn is_route_not_found(&self) -> bool {
        matches!(self, HttpzError::RouteNotFound(_))
    }

    /// The circuit breaker rejected the call before any I/O.
    #[must_use]
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, HttpzError::BreakerOpen(_))
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpzError::Transport(_))
    }

    /// The call future was dropped mid-flight.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HttpzError::Cancelled)
    }

    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, HttpzError::Decode { .. })
    }

    /// The raw response kept by a decode failure.
    #[must_use]
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            HttpzError::Decode { response, .. } => Some(response),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HttpzError>;
