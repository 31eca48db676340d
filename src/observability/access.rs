//! Access log records.
//!
//! One `info` event per response on the `h1_engine::access` target, so the
//! records can be filtered or routed separately from diagnostics.

use std::time::Duration;

use crate::server::{AccessLog, RequestMessage, Response};

/// Writes access records through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn log(&self, message: Option<&RequestMessage>, response: &Response, elapsed: Duration) {
        let (method, path) = match message {
            Some(m) => (m.method.as_str(), m.path.as_str()),
            None => ("-", "-"),
        };
        tracing::info!(
            target: "h1_engine::access",
            method,
            path,
            status = response.status,
            bytes = response.body.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Request completed"
        );
    }
}
