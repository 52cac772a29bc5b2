// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token refreshes.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	network_calls: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns how many callers needed a refresh, including those that joined one in flight.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns how many refresh exchanges actually reached the token endpoint.
	pub fn network_calls(&self) -> u64 {
		self.network_calls.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that were exchanged and persisted.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refreshes.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_network_call(&self) {
		self.network_calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
