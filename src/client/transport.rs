// SPDX-License-Identifier: MIT OR Apache-2.0

//! The HTTP round trip beneath the pipeline.

use bytes::Bytes;
use http::{HeaderMap, Method};
use std::time::Duration;
use url::Url;

use crate::client::RawResponse;
use crate::error::Result;
use crate::runtime::RetryConfig;

/// Sends fully built requests, retrying attempts as configured.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: reqwest::Client,
    retry: RetryConfig,
}

/// One request as it goes on the wire.
pub(crate) struct Outbound<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    pub body: Option<&'a Bytes>,
    pub timeout: Option<Duration>,
}

impl Transport {
    pub fn new(http: reqwest::Client, retry: RetryConfig) -> Self {
        Self { http, retry }
    }

    /// Send the request and read the whole body. The returned response has a
    /// zero duration; the caller times the round trip.
    pub async fn send(&self, outbound: &Outbound<'_>) -> Result<RawResponse> {
        let response = self.retry.execute(|| self.attempt(outbound)).await?;
        Ok(response)
    }

    async fn attempt(&self, outbound: &Outbound<'_>) -> std::result::Result<RawResponse, reqwest::Error> {
        let mut builder = self
            .http
            .request(outbound.method.clone(), outbound.url.clone())
            .headers(outbound.headers.clone());
        if let Some(body) = outbound.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = outbound.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            url,
            status,
            headers,
            body,
            duration: Duration::ZERO,
        })
    }
}
