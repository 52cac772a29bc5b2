//! Observability helpers shared by the client, cache, limiter, and token source.
//!
//! # Feature Flags
//!
//! - Spans named `lms_api.request` and `lms_api.refresh` are always emitted through `tracing`.
//! - Enable `metrics` to increment the `lms_api_events_total` counter for every recorded event,
//!   labeled by `stage` + `outcome`.

mod counter;
mod span;

pub use counter::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Outbound API request (one per attempt).
	Request,
	/// Disk cache lookup/store.
	Cache,
	/// Token refresh against the token endpoint.
	Refresh,
	/// Client-side rate limiting.
	RateLimit,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Request => "request",
			Stage::Cache => "cache",
			Stage::Refresh => "refresh",
			Stage::RateLimit => "rate_limit",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to a stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Transient failure that will be retried.
	Retry,
	/// Cache hit.
	Hit,
	/// Cache miss.
	Miss,
	/// Caller had to wait.
	Wait,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
			Outcome::Retry => "retry",
			Outcome::Hit => "hit",
			Outcome::Miss => "miss",
			Outcome::Wait => "wait",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
