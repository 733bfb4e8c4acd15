use tracing::{Span, field};

use super::TraceId;

/// Root span for a process-level job (startup, shutdown, statistics pass).
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id.as_str(),
        pair = field::Empty
    )
}

/// Child span; inherits the trace id from whatever span is current.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name, pair = field::Empty)
}

/// Span wrapping one pair's evaluation loop for its whole lifetime.
pub fn pair_span(pair_id: &str) -> Span {
    tracing::info_span!("pair_monitor", pair = %pair_id)
}
