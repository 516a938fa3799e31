// src/logging/trace.rs
//! W3C trace context carried through a request.
//!
//! The middleware parses an inbound `traceparent` header and runs the rest of
//! the request inside [`scope`]. Anything logged from within that future can
//! then pick the identifiers up with [`get_trace_context`].

use std::collections::HashMap;
use std::future::Future;

use axum::http::HeaderMap;

pub const TRACEPARENT_HEADER: &str = "traceparent";

tokio::task_local! {
    static CURRENT_TRACE: TraceContext;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    /// Parse `version-trace_id-parent_id-flags`. All-zero ids are invalid.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || version == "ff" || !is_hex(version) {
            return None;
        }
        // Version 00 has exactly four fields.
        if version == "00" && parts.next().is_some() {
            return None;
        }
        if flags.len() != 2 || !is_hex(flags) {
            return None;
        }
        if !is_valid_id(trace_id, 32) || !is_valid_id(span_id, 16) {
            return None;
        }

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
        })
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(TRACEPARENT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(Self::from_traceparent)
    }

    fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("trace_id".to_string(), self.trace_id.clone()),
            ("span_id".to_string(), self.span_id.clone()),
        ])
    }
}

fn is_hex(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_valid_id(value: &str, len: usize) -> bool {
    value.len() == len && is_hex(value) && value.chars().any(|c| c != '0')
}

/// Run `fut` with `context` as the active trace, if there is one.
pub async fn scope<F: Future>(context: Option<TraceContext>, fut: F) -> F::Output {
    match context {
        Some(context) => CURRENT_TRACE.scope(context, fut).await,
        None => fut.await,
    }
}

/// `{trace_id, span_id}` of the active trace, or an empty map outside of
/// any trace scope.
pub fn get_trace_context() -> HashMap<String, String> {
    CURRENT_TRACE
        .try_with(TraceContext::to_map)
        .unwrap_or_default()
}
