// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response envelopes returned by [`HttpzClient`](crate::HttpzClient).

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::error::{HttpzError, Result};

/// A completed HTTP exchange, before any decoding.
///
/// A 4xx/5xx status is still a `RawResponse`, not an error.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub(crate) url: Url,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) duration: Duration,
}

impl RawResponse {
    /// Final URL of the exchange.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Wall-clock time of the transport round trip, retries included.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns `true` for status codes of 400 and above.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    ///
    /// # Errors
    ///
    /// Returns `HttpzError::Decode` carrying a copy of this response.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
        serde_json::from_slice(bytes).map_err(|source| HttpzError::Decode {
            source,
            response: Box::new(self.clone()),
        })
    }
}

/// A typed response: the decoded result paired with the raw exchange.
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// Decoded body; `None` when the status denotes an error.
    pub result: Option<T>,
    raw: RawResponse,
}

impl<T: DeserializeOwned> Response<T> {
    /// Decode a raw response. Only success statuses are decoded into `T`.
    pub(crate) fn decode(raw: RawResponse) -> Result<Self> {
        let result = if raw.is_error() {
            None
        } else {
            Some(raw.json::<T>()?)
        };
        Ok(Self { result, raw })
    }
}

impl<T> Response<T> {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.raw.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.raw.headers
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.raw.body
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.raw.duration
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.raw.is_error()
    }

    #[must_use]
    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    /// Decode an error body into a caller-chosen type.
    ///
    /// # Errors
    ///
    /// Returns `HttpzError::Decode` if the body does not match `E`.
    pub fn error_as<E: DeserializeOwned>(&self) -> Result<E> {
        self.raw.json()
    }

    /// Split into the decoded result and the raw exchange.
    #[must_use]
    pub fn into_parts(self) -> (Option<T>, RawResponse) {
        (self.result, self.raw)
    }
}
