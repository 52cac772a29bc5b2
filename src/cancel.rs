//! Cooperative cancellation shared between a command and the requests it issues.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use tokio::sync::Notify;
// self
use crate::_prelude::*;

#[derive(Debug, Default)]
struct CancelState {
	cancelled: AtomicBool,
	notify: Notify,
}

/// Clonable cancellation flag; every clone observes the same state.
///
/// Blocking points in the client (rate limiting, backoff, HTTP round-trips, waiting on a token
/// refresh) race [`CancelToken::cancelled`] and return [`Error::Cancelled`] once it fires.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<CancelState>);
impl CancelToken {
	/// Creates a token that has not been cancelled.
	pub fn new() -> Self {
		Self::default()
	}

	/// Cancels the token and wakes every waiter.
	pub fn cancel(&self) {
		self.0.cancelled.store(true, Ordering::SeqCst);
		self.0.notify.notify_waiters();
	}

	/// Returns `true` once [`cancel`](Self::cancel) has been called.
	pub fn is_cancelled(&self) -> bool {
		self.0.cancelled.load(Ordering::SeqCst)
	}

	/// Resolves once the token is cancelled.
	pub async fn cancelled(&self) {
		loop {
			let notified = self.0.notify.notified();

			if self.is_cancelled() {
				return;
			}

			notified.await;
		}
	}

	/// Fails with [`Error::Cancelled`] if the token has already fired.
	pub fn check(&self) -> Result<()> {
		if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
	}

	/// Runs `fut` to completion unless the token fires first.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		self.check()?;

		tokio::select! {
			biased;
			_ = self.cancelled() => Err(Error::Cancelled),
			result = fut => result,
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;

	#[tokio::test]
	async fn run_returns_cancelled_when_fired_mid_flight() {
		let token = CancelToken::new();
		let trigger = token.clone();
		let handle = tokio::spawn(async move {
			tokio::time::sleep(StdDuration::from_millis(20)).await;
			trigger.cancel();
		});
		let result = token
			.run(async {
				tokio::time::sleep(StdDuration::from_secs(30)).await;

				Ok(())
			})
			.await;

		assert!(matches!(result, Err(Error::Cancelled)));
		assert!(token.is_cancelled());

		handle.await.expect("Cancellation task should finish.");
	}

	#[tokio::test]
	async fn run_passes_results_through() {
		let token = CancelToken::new();

		assert_eq!(token.run(async { Ok(7) }).await.expect("Future should complete."), 7);

		token.cancel();

		assert!(matches!(token.check(), Err(Error::Cancelled)));
		assert!(matches!(token.run(async { Ok(7) }).await, Err(Error::Cancelled)));
	}
}
