use async_nats::HeaderMap;
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// W3C Trace Context header names
const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        vec![TRACEPARENT, TRACESTATE]
    }
}

/// Inject the current span's trace context into outgoing NATS headers.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        let ctx = Span::current().context();
        propagator.inject_context(&ctx, &mut HeaderInjector(headers));
    });
}

/// Extract the publisher's trace context from incoming NATS headers.
pub fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Parent `span` on the trace carried by `headers`, if any.
///
/// Used for per-event spans so each event joins the trace of whoever
/// published the document event.
pub fn set_span_parent_from_headers(span: &Span, headers: Option<&HeaderMap>) {
    if let Some(headers) = headers {
        span.set_parent(extract_trace_context(headers));
    }
}
