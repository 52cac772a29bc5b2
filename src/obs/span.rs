// crates.io
use tracing::Span;

/// Span wrapping one logical API request (cache lookup, attempts, pagination).
pub fn request_span(method: &str, endpoint: &str) -> Span {
	tracing::info_span!("lms_api.request", method, endpoint)
}

/// Span wrapping one network refresh for an instance.
pub fn refresh_span(instance: &str) -> Span {
	tracing::info_span!("lms_api.refresh", instance)
}
