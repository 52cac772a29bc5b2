//! Just-in-time access tokens with single-flight refresh.
//!
//! [`TokenSource::token`] hands out the cached access token until it enters the skew window,
//! then redeems the refresh token. Concurrent callers that discover expiry together share one
//! [`Shared`] refresh future, so the token endpoint sees exactly one exchange. The refreshed token
//! is written to the [`TokenStore`] before the in-memory copy is replaced and before any waiter is
//! released; a failed refresh leaves both untouched and surfaces as [`Error::AuthExpired`].

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::Weak;
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	auth::{InstanceName, Token, TokenSecret},
	cancel::CancelToken,
	oauth::{OAuth2Config, OAuth2Refresher, TokenRefresher},
	obs::{self, Outcome, Stage},
	store::{StoreError, TokenStore},
};

type RefreshFlight = Shared<BoxFuture<'static, Result<Token, RefreshFailure>>>;

/// Settings for a [`TokenSource`].
#[derive(Clone, Debug)]
pub struct TokenSourceConfig {
	/// Instance whose token this source manages.
	pub instance: InstanceName,
	/// Refresh proactively once the token expires within this window.
	pub skew: Duration,
}
impl TokenSourceConfig {
	/// Default skew window.
	pub const DEFAULT_SKEW: Duration = Duration::seconds(60);

	/// Creates settings with the default skew window.
	pub fn new(instance: InstanceName) -> Self {
		Self { instance, skew: Self::DEFAULT_SKEW }
	}

	/// Overrides the skew window. Negative values are treated as zero.
	pub fn with_skew(mut self, skew: Duration) -> Self {
		self.skew = skew.max(Duration::ZERO);

		self
	}
}

// Refresh errors are fanned out to every waiter, so they travel as a clonable summary.
#[derive(Clone, Debug)]
struct RefreshFailure {
	reason: String,
	status: Option<u16>,
}
impl From<RefreshFailure> for Error {
	fn from(failure: RefreshFailure) -> Self {
		Error::AuthExpired { reason: failure.reason, status: failure.status }
	}
}

#[derive(Default)]
struct SourceState {
	current: Option<Token>,
	in_flight: Option<RefreshFlight>,
}

/// Yields valid access tokens for one instance, refreshing them at most once at a time.
pub struct TokenSource {
	config: TokenSourceConfig,
	store: Arc<dyn TokenStore>,
	refresher: Arc<dyn TokenRefresher>,
	load_gate: AsyncMutex<()>,
	state: Arc<Mutex<SourceState>>,
	metrics: Arc<RefreshMetrics>,
}
impl TokenSource {
	/// Creates a source over `store`, refreshing through `refresher`.
	pub fn new(
		config: TokenSourceConfig,
		store: Arc<dyn TokenStore>,
		refresher: Arc<dyn TokenRefresher>,
	) -> Self {
		Self {
			config,
			store,
			refresher,
			load_gate: AsyncMutex::new(()),
			state: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Creates a source that refreshes with the OAuth 2.0 refresh-token grant.
	pub fn oauth2(
		config: TokenSourceConfig,
		store: Arc<dyn TokenStore>,
		oauth: &OAuth2Config,
	) -> Result<Self> {
		let refresher = OAuth2Refresher::new(oauth)?;

		Ok(Self::new(config, store, Arc::new(refresher)))
	}

	/// Instance this source manages.
	pub fn instance(&self) -> &InstanceName {
		&self.config.instance
	}

	/// Configured skew window.
	pub fn skew(&self) -> Duration {
		self.config.skew
	}

	/// Refresh counters for this source.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		Arc::clone(&self.metrics)
	}

	/// Snapshot of the in-memory token, if one has been loaded.
	pub fn current(&self) -> Option<Token> {
		self.state.lock().current.clone()
	}

	/// Returns an access token that is valid beyond the skew window, refreshing first if needed.
	pub async fn token(&self, cancel: &CancelToken) -> Result<TokenSecret> {
		cancel.check()?;
		self.ensure_loaded(cancel).await?;

		let flight = {
			let mut state = self.state.lock();
			let current = state.current.clone().ok_or_else(|| self.missing())?;

			if !current.needs_refresh_at(OffsetDateTime::now_utc(), self.config.skew) {
				return Ok(current.access_token);
			}
			if current.refresh_token.is_none() {
				if current.is_expired() {
					return Err(Error::AuthExpired {
						reason: "token expired and no refresh token is stored".into(),
						status: None,
					});
				}

				return Ok(current.access_token);
			}

			self.join_or_start(&mut state, current)
		};

		self.wait(flight, cancel).await
	}

	/// Refreshes regardless of expiry because the API rejected `stale`.
	///
	/// Returns the current token without a network call if another caller already replaced
	/// `stale`, and joins a refresh that is already in flight.
	pub async fn force_refresh(
		&self,
		stale: &TokenSecret,
		cancel: &CancelToken,
	) -> Result<TokenSecret> {
		cancel.check()?;
		self.ensure_loaded(cancel).await?;

		let flight = {
			let mut state = self.state.lock();
			let current = state.current.clone().ok_or_else(|| self.missing())?;

			if current.access_token != *stale && state.in_flight.is_none() {
				return Ok(current.access_token);
			}

			self.join_or_start(&mut state, current)
		};

		self.wait(flight, cancel).await
	}

	/// Persists a token obtained out of band (login, `token set`) and makes it current.
	pub async fn store_token(&self, token: Token) -> Result<()> {
		self.store.save(&token).await?;
		self.state.lock().current = Some(token);

		Ok(())
	}

	/// Deletes the stored token for this instance and forgets the in-memory copy.
	pub async fn logout(&self) -> Result<()> {
		self.state.lock().current = None;

		match self.store.delete(&self.config.instance).await {
			Ok(()) => Ok(()),
			Err(err) if err.is_not_found() => Ok(()),
			Err(err) => Err(err.into()),
		}
	}

	// Reloads whenever nothing is in memory, so a token saved by another process after `logout`
	// is picked up.
	async fn ensure_loaded(&self, cancel: &CancelToken) -> Result<()> {
		if self.state.lock().current.is_some() {
			return Ok(());
		}

		cancel
			.run(async {
				let _gate = self.load_gate.lock().await;

				if self.state.lock().current.is_some() {
					return Ok(());
				}

				let token = self.store.load(&self.config.instance).await?;

				self.state.lock().current.get_or_insert(token);

				Ok::<_, Error>(())
			})
			.await
	}

	fn missing(&self) -> Error {
		StoreError::not_found(&self.config.instance).into()
	}

	fn join_or_start(&self, state: &mut SourceState, current: Token) -> RefreshFlight {
		self.metrics.record_attempt();

		if let Some(flight) = &state.in_flight {
			tracing::debug!(instance = %self.config.instance, "joining in-flight refresh");

			return flight.clone();
		}

		let flight = refresh_flight(
			current,
			Arc::clone(&self.store),
			Arc::clone(&self.refresher),
			Arc::clone(&self.metrics),
			Arc::downgrade(&self.state),
		)
		.boxed()
		.shared();

		state.in_flight = Some(flight.clone());

		flight
	}

	async fn wait(&self, flight: RefreshFlight, cancel: &CancelToken) -> Result<TokenSecret> {
		cancel.run(async { flight.await.map(|token| token.access_token).map_err(Error::from) }).await
	}
}
impl Debug for TokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSource")
			.field("instance", &self.config.instance)
			.field("skew", &self.config.skew)
			.field("store", &self.store.backend())
			.finish()
	}
}

async fn refresh_flight(
	current: Token,
	store: Arc<dyn TokenStore>,
	refresher: Arc<dyn TokenRefresher>,
	metrics: Arc<RefreshMetrics>,
	state: Weak<Mutex<SourceState>>,
) -> Result<Token, RefreshFailure> {
	let span = obs::refresh_span(current.instance.as_ref());

	metrics.record_network_call();
	obs::record(Stage::Refresh, Outcome::Attempt);

	let outcome = async {
		let token = refresher.refresh(&current).await?;

		// Persist before anyone can observe the new token.
		store.save(&token).await.map_err(|err| Error::AuthExpired {
			reason: format!("refreshed token could not be persisted: {err}"),
			status: None,
		})?;

		Ok::<_, Error>(token)
	}
	.instrument(span)
	.await;

	let state = state.upgrade();
	let mut guard = state.as_ref().map(|state| state.lock());

	if let Some(state) = guard.as_mut() {
		state.in_flight = None;
	}

	match outcome {
		Ok(token) => {
			if let Some(state) = guard.as_mut() {
				state.current = Some(token.clone());
			}

			metrics.record_success();
			obs::record(Stage::Refresh, Outcome::Success);
			tracing::debug!(instance = %token.instance, "access token refreshed");

			Ok(token)
		},
		Err(err) => {
			metrics.record_failure();
			obs::record(Stage::Refresh, Outcome::Failure);
			tracing::warn!(instance = %current.instance, error = %err, "token refresh failed");

			Err(RefreshFailure { reason: refresh_reason(&err), status: err.status() })
		},
	}
}

fn refresh_reason(err: &Error) -> String {
	match err {
		Error::AuthExpired { reason, .. } => reason.clone(),
		other => other.to_string(),
	}
}
