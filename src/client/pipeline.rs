// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-call orchestration: route resolution, request assembly, breaker gate,
//! stage hooks and the transport round trip.

use http::header::{HeaderValue, AUTHORIZATION};
use http::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::client::paths::{expand, PathRegistry};
use crate::client::request::{Auth, Request};
use crate::client::transport::{Outbound, Transport};
use crate::client::RawResponse;
use crate::error::{HttpzError, Result};
use crate::runtime::stage::{Call, Chain, Outcome};
use crate::runtime::CircuitBreaker;

pub(crate) struct Pipeline {
    pub name: String,
    pub version: String,
    pub base_url: String,
    pub paths: PathRegistry,
    /// Client headers with the content-type and user-agent defaults applied.
    pub headers: HeaderMap,
    /// Default transport deadline, overridden per request.
    pub timeout: Option<Duration>,
    pub chain: Chain,
    pub breaker: Option<Arc<CircuitBreaker>>,
    pub transport: Transport,
}

impl Pipeline {
    pub async fn run(&self, request: Request) -> Result<RawResponse> {
        let Request {
            method,
            route,
            path_params,
            query_params,
            headers,
            body,
            auth,
            timeout,
            context,
            invalid,
        } = request;

        let template = self
            .paths
            .resolve(&route)
            .ok_or_else(|| HttpzError::RouteNotFound(route.clone()))?;
        if let Some(error) = invalid {
            return Err(error);
        }
        let url = self.url(template, &path_params, &query_params)?;
        let headers = self.merge_headers(headers, auth.as_ref())?;

        let permit = match &self.breaker {
            Some(breaker) => Some(breaker.try_acquire().await?),
            None => None,
        };

        let mut call = Call::new(route, method, url, headers, body, context);
        let (entered, ready) = self.chain.before(&mut call);
        let mut in_flight = InFlight {
            chain: &self.chain,
            entered,
            call,
            started: Instant::now(),
            done: false,
        };
        if let Err(error) = ready {
            in_flight.finish(Outcome::Failed(&error));
            return Err(error);
        }

        let result = {
            let call = &in_flight.call;
            self.transport
                .send(&Outbound {
                    method: &call.method,
                    url: &call.url,
                    headers: &call.headers,
                    body: call.body.as_ref(),
                    timeout: timeout.or(self.timeout),
                })
                .await
        };
        let elapsed = in_flight.started.elapsed();
        in_flight.call.elapsed = elapsed;

        match result {
            Ok(mut response) => {
                response.duration = elapsed;
                in_flight.finish(Outcome::Response(&response));
                if let Some(permit) = permit {
                    permit.record(&response).await;
                }
                Ok(response)
            }
            Err(error) => {
                in_flight.finish(Outcome::Failed(&error));
                if let Some(permit) = permit {
                    permit.record_failure().await;
                }
                Err(error)
            }
        }
    }

    fn url(
        &self,
        template: &str,
        path_params: &[(String, String)],
        query_params: &[(String, String)],
    ) -> Result<Url> {
        let path = expand(template, path_params);
        let base = self.base_url.trim_end_matches('/');
        let raw = if path.starts_with('/') || path.is_empty() {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| HttpzError::Config(format!("invalid request URL {raw:?}: {e}")))?;
        if !query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(
                query_params
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            );
        }
        Ok(url)
    }

    fn merge_headers(&self, overrides: HeaderMap, auth: Option<&Auth>) -> Result<HeaderMap> {
        let mut headers = self.headers.clone();
        for (name, value) in &overrides {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(auth) = auth {
            headers.insert(AUTHORIZATION, auth.header_value()?);
        }
        Ok(headers)
    }
}

/// Build the client-level header set: configured headers plus the
/// content-type and user-agent defaults when they are not configured.
pub(crate) fn default_headers(mut headers: HeaderMap, name: &str, version: &str) -> Result<HeaderMap> {
    if !headers.contains_key(http::header::CONTENT_TYPE) {
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    if !headers.contains_key(http::header::USER_AGENT) {
        let agent = HeaderValue::from_str(&format!("{name}/{version}"))
            .map_err(|e| HttpzError::Config(format!("invalid user agent: {e}")))?;
        headers.insert(http::header::USER_AGENT, agent);
    }
    Ok(headers)
}

/// A call whose `before` hooks ran. Its `after` hooks run exactly once:
/// through `finish`, or from `Drop` when the call future is dropped early.
struct InFlight<'a> {
    chain: &'a Chain,
    entered: usize,
    call: Call,
    started: Instant,
    done: bool,
}

impl InFlight<'_> {
    fn finish(&mut self, outcome: Outcome<'_>) {
        if self.done {
            return;
        }
        self.done = true;
        self.chain.after(self.entered, &mut self.call, outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // On panic the span guard closes the span by itself.
        if self.done || std::thread::panicking() {
            return;
        }
        self.call.elapsed = self.started.elapsed();
        self.finish(Outcome::Failed(&HttpzError::Cancelled));
    }
}
