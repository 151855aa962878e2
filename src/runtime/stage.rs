// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered before/after hooks wrapped around the transport call.
//!
//! Stages run `before` in registration order and `after` in reverse order, so
//! with `[tracing, logging]` the span exists before the request is logged and
//! the response is logged before the span closes.

use bytes::Bytes;
use http::{HeaderMap, Method};
use opentelemetry::Context;
use std::time::Duration;
use url::Url;

use crate::client::RawResponse;
use crate::error::{HttpzError, Result};
use crate::runtime::tracing::SpanState;

/// Trace identifiers exposed to the logging stage for correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Correlation {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
}

/// State owned by one in-flight call.
pub(crate) struct Call {
    pub route: String,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Caller context, replaced by the child context once a span starts.
    pub cx: Context,
    pub span: SpanState,
    pub correlation: Option<Correlation>,
    /// Transport time, set once the transport call returns.
    pub elapsed: Duration,
}

impl Call {
    pub fn new(
        route: String,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
        cx: Context,
    ) -> Self {
        Self {
            route,
            method,
            url,
            headers,
            body,
            cx,
            span: SpanState::Idle,
            correlation: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// How a call ended, as seen by `after` hooks.
#[derive(Clone, Copy)]
pub(crate) enum Outcome<'a> {
    /// The exchange completed; the status may still denote an HTTP error.
    Response(&'a RawResponse),
    /// Transport failure, or a stage aborted the call before sending.
    Failed(&'a HttpzError),
}

pub(crate) trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before the transport call. An error aborts the send.
    fn before(&self, call: &mut Call) -> Result<()>;

    /// Runs exactly once for every stage whose `before` was entered.
    fn after(&self, call: &mut Call, outcome: Outcome<'_>);
}

/// An ordered list of stages.
#[derive(Default)]
pub(crate) struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run `before` hooks in order. Returns how many stages were entered;
    /// a failing stage counts as entered so its `after` hook still runs.
    pub fn before(&self, call: &mut Call) -> (usize, Result<()>) {
        for (i, stage) in self.stages.iter().enumerate() {
            if let Err(e) = stage.before(call) {
                return (i + 1, Err(e));
            }
        }
        (self.stages.len(), Ok(()))
    }

    /// Run `after` hooks of the first `entered` stages in reverse order.
    pub fn after(&self, entered: usize, call: &mut Call, outcome: Outcome<'_>) {
        for stage in self.stages[..entered].iter().rev() {
            stage.after(call, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn before(&self, _call: &mut Call) -> Result<()> {
            self.journal.lock().unwrap().push(format!("before:{}", self.name));
            if self.fail {
                return Err(HttpzError::Validation("refused".to_string()));
            }
            Ok(())
        }

        fn after(&self, _call: &mut Call, outcome: Outcome<'_>) {
            let kind = match outcome {
                Outcome::Response(_) => "ok",
                Outcome::Failed(_) => "failed",
            };
            self.journal
                .lock()
                .unwrap()
                .push(format!("after:{}:{kind}", self.name));
        }
    }

    fn call() -> Call {
        Call::new(
            "route".to_string(),
            Method::GET,
            Url::parse("http://localhost/x").unwrap(),
            HeaderMap::new(),
            None,
            Context::new(),
        )
    }

    fn chain(journal: &Arc<Mutex<Vec<String>>>, failing: Option<&'static str>) -> Chain {
        let mut chain = Chain::new();
        for name in ["a", "b", "c"] {
            chain.push(Box::new(Recorder {
                name,
                journal: journal.clone(),
                fail: failing == Some(name),
            }));
        }
        chain
    }

    #[test]
    fn test_after_runs_in_reverse_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(&journal, None);
        let mut call = call();

        let (entered, result) = chain.before(&mut call);
        assert!(result.is_ok());
        assert_eq!(entered, 3);

        let err = HttpzError::Validation("x".to_string());
        chain.after(entered, &mut call, Outcome::Failed(&err));

        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "before:a",
                "before:b",
                "before:c",
                "after:c:failed",
                "after:b:failed",
                "after:a:failed"
            ]
        );
        assert_eq!(chain.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_stage_stops_chain_but_is_unwound() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(&journal, Some("b"));
        let mut call = call();

        let (entered, result) = chain.before(&mut call);
        assert!(result.is_err());
        assert_eq!(entered, 2);

        let err = result.unwrap_err();
        chain.after(entered, &mut call, Outcome::Failed(&err));

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["before:a", "before:b", "after:b:failed", "after:a:failed"]
        );
    }
}
