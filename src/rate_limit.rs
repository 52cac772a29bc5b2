//! GCRA limiter that gates outbound API calls to a configured request rate.
//!
//! Cells are emitted every `1 / rate` seconds with up to `burst` admitted back to back. A cell is
//! only consumed when a caller is admitted, so a waiter that gives up never costs anyone else a
//! slot.

// std
use std::{num::NonZeroU32, time::Duration as StdDuration};
// crates.io
use governor::{
	Quota, RateLimiter as GovernorLimiter,
	clock::{Clock, DefaultClock},
	middleware::NoOpMiddleware,
	state::{InMemoryState, NotKeyed},
};
// self
use crate::{
	_prelude::*,
	cancel::CancelToken,
	obs::{self, Outcome, Stage},
};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Request-rate limiter shared by every call a client issues. A rate of zero disables limiting.
pub struct RateLimiter {
	rate: f64,
	burst: u32,
	limiter: Option<DirectLimiter>,
}
impl RateLimiter {
	/// Creates a limiter admitting `rate` requests per second with the given burst capacity.
	///
	/// `burst` is clamped to at least one; non-finite or non-positive rates disable limiting.
	pub fn new(rate: f64, burst: u32) -> Self {
		let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
		let quota = if rate.is_finite() && rate > 0. {
			Quota::with_period(StdDuration::from_secs_f64(1. / rate))
				.map(|quota| quota.allow_burst(burst))
		} else {
			None
		};

		match quota {
			Some(quota) =>
				Self { rate, burst: burst.get(), limiter: Some(GovernorLimiter::direct(quota)) },
			None => Self { rate: 0., burst: burst.get(), limiter: None },
		}
	}

	/// Limiter that never waits.
	pub fn disabled() -> Self {
		Self::new(0., 1)
	}

	/// Returns `true` when the limiter never waits.
	pub fn is_disabled(&self) -> bool {
		self.limiter.is_none()
	}

	/// Configured requests per second.
	pub fn rate(&self) -> f64 {
		self.rate
	}

	/// Number of requests admitted back to back.
	pub fn burst(&self) -> u32 {
		self.burst
	}

	/// Waits for a slot, failing with [`Error::Cancelled`] if `cancel` fires first.
	pub async fn acquire(&self, cancel: &CancelToken) -> Result<()> {
		cancel.check()?;

		let Some(limiter) = &self.limiter else {
			return Ok(());
		};
		let wait = match limiter.check() {
			Ok(()) => return Ok(()),
			Err(not_until) => not_until.wait_time_from(DefaultClock::default().now()),
		};

		tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
		obs::record(Stage::RateLimit, Outcome::Wait);

		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(Error::Cancelled),
			_ = limiter.until_ready() => Ok(()),
		}
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("rate", &self.rate)
			.field("burst", &self.burst)
			.field("disabled", &self.is_disabled())
			.finish()
	}
}
