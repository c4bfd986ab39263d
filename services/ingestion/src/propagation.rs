//! Incoming trace context, so a request's log lines can be joined with the
//! caller's trace.

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName};
use opentelemetry::{
    Context,
    propagation::{
        text_map_propagator::FieldIter, Extractor, Injector, TextMapCompositePropagator,
        TextMapPropagator,
    },
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use regex::Regex;

pub const CLOUD_TRACE_HEADER: &str = "x-cloud-trace-context";

static CLOUD_TRACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{32})/([0-9]+)(?:;o=([01]))?$")
        .expect("cloud trace pattern is a valid regex")
});

static CLOUD_TRACE_FIELDS: LazyLock<[String; 1]> =
    LazyLock::new(|| [CLOUD_TRACE_HEADER.to_string()]);

/// Google Cloud `X-Cloud-Trace-Context: TRACE_ID/SPAN_ID;o=OPTIONS`, where the
/// span ID is decimal and `o=1` marks the trace as sampled.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudTraceContextPropagator;

impl CloudTraceContextPropagator {
    fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let captures = CLOUD_TRACE_PATTERN.captures(extractor.get(CLOUD_TRACE_HEADER)?)?;
        let trace_id = TraceId::from_hex(&captures[1]).ok()?;
        let span_id = SpanId::from_bytes(captures[2].parse::<u64>().ok()?.to_be_bytes());
        let flags = match captures.get(3).map(|options| options.as_str()) {
            Some("1") => TraceFlags::SAMPLED,
            _ => TraceFlags::default(),
        };

        let span_context = SpanContext::new(trace_id, span_id, flags, true, TraceState::default());
        span_context.is_valid().then_some(span_context)
    }
}

impl TextMapPropagator for CloudTraceContextPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            injector.set(
                CLOUD_TRACE_HEADER,
                format!(
                    "{}/{};o={}",
                    span_context.trace_id(),
                    u64::from_be_bytes(span_context.span_id().to_bytes()),
                    u8::from(span_context.is_sampled())
                ),
            );
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match self.extract_span_context(extractor) {
            Some(span_context) => cx.with_remote_span_context(span_context),
            None => cx.clone(),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(CLOUD_TRACE_FIELDS.as_ref())
    }
}

/// Reads trace headers from an axum request.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Cloud Trace runs first, so a W3C `traceparent` on the same request wins.
pub fn incoming_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(CloudTraceContextPropagator),
        Box::new(TraceContextPropagator::new()),
    ])
}

/// The caller's span, if the request carried a valid trace header.
pub fn remote_parent(propagator: &dyn TextMapPropagator, headers: &HeaderMap) -> Option<SpanContext> {
    let cx = propagator.extract_with_context(&Context::new(), &HeaderExtractor(headers));
    let parent = cx.span().span_context().clone();
    parent.is_valid().then_some(parent)
}
