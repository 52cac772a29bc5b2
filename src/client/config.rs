//! Immutable client configuration and the builder that validates it.

// std
use std::{path::PathBuf, time::Duration as StdDuration};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError, source::TokenSource};

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("lms-api/", env!("CARGO_PKG_VERSION"));

/// Path prefixes (relative to the API root) whose GET responses vary per caller or session and
/// must never be cached.
pub const DEFAULT_UNCACHEABLE_PATHS: &[&str] =
	&["users/self", "conversations", "planner", "announcements", "login"];

/// Where bearer tokens come from.
#[derive(Clone, Debug, Default)]
pub enum Credentials {
	/// Requests are sent without an `Authorization` header.
	#[default]
	Anonymous,
	/// A fixed personal access token; never refreshed.
	Static(TokenSecret),
	/// Tokens managed by a refreshing [`TokenSource`].
	Source(Arc<TokenSource>),
}

/// Immutable client settings, built once per invocation via [`ClientConfig::builder`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
	base_url: Url,
	credentials: Credentials,
	requests_per_sec: f64,
	burst: u32,
	cache_enabled: bool,
	cache_ttl: Duration,
	cache_dir: Option<PathBuf>,
	timeout: StdDuration,
	user_agent: String,
	max_attempts: u32,
	retry_base_delay: StdDuration,
	uncacheable_paths: Vec<String>,
}
impl ClientConfig {
	/// Starts a builder for the API rooted at `base_url`.
	pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// API root; always ends with `/` so relative paths join beneath it.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Configured credentials.
	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	/// Requests per second; zero disables limiting.
	pub fn requests_per_sec(&self) -> f64 {
		self.requests_per_sec
	}

	/// Rate limiter burst capacity.
	pub fn burst(&self) -> u32 {
		self.burst
	}

	/// Whether cacheable GETs consult the disk cache.
	pub fn cache_enabled(&self) -> bool {
		self.cache_enabled
	}

	/// Lifetime stamped on cached responses.
	pub fn cache_ttl(&self) -> Duration {
		self.cache_ttl
	}

	/// Explicit cache directory, if one was configured.
	pub fn cache_dir(&self) -> Option<&PathBuf> {
		self.cache_dir.as_ref()
	}

	/// Per-request timeout.
	pub fn timeout(&self) -> StdDuration {
		self.timeout
	}

	/// `User-Agent` header value.
	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}

	/// Attempt budget for idempotent requests answered with 429 or 5xx.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// First backoff delay; doubles on every further attempt.
	pub fn retry_base_delay(&self) -> StdDuration {
		self.retry_base_delay
	}

	/// Path prefixes excluded from caching.
	pub fn uncacheable_paths(&self) -> &[String] {
		&self.uncacheable_paths
	}

	/// Returns `true` when `path` falls under an uncacheable prefix.
	///
	/// Matching ignores a leading `/` and an `api/v1/` prefix, and only matches whole segments.
	pub fn is_uncacheable(&self, path: &str) -> bool {
		let path = path.trim_start_matches('/');
		let path = path.strip_prefix("api/v1/").unwrap_or(path);

		self.uncacheable_paths.iter().any(|prefix| {
			let prefix = prefix.trim_matches('/');

			path.strip_prefix(prefix)
				.is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
		})
	}
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// API root URL.
	pub base_url: String,
	/// Static token, mutually exclusive with `token_source`.
	pub token: Option<TokenSecret>,
	/// Refreshing token source, mutually exclusive with `token`.
	pub token_source: Option<Arc<TokenSource>>,
	/// Requests per second; zero disables limiting.
	pub requests_per_sec: f64,
	/// Rate limiter burst capacity (at least one).
	pub burst: u32,
	/// Enables the disk response cache.
	pub cache_enabled: bool,
	/// Response cache lifetime.
	pub cache_ttl: Duration,
	/// Cache directory override.
	pub cache_dir: Option<PathBuf>,
	/// Per-request timeout.
	pub timeout: StdDuration,
	/// `User-Agent` header value.
	pub user_agent: String,
	/// Idempotent retry budget (at least one).
	pub max_attempts: u32,
	/// First backoff delay.
	pub retry_base_delay: StdDuration,
	/// Uncacheable path prefixes.
	pub uncacheable_paths: Vec<String>,
}
impl ClientConfigBuilder {
	/// Default cache lifetime.
	pub const DEFAULT_CACHE_TTL: Duration = Duration::minutes(5);
	/// Default per-request timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);
	/// Default idempotent retry budget.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
	/// Default first backoff delay.
	pub const DEFAULT_RETRY_BASE_DELAY: StdDuration = StdDuration::from_millis(250);

	/// Creates a builder seeded with defaults.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			token: None,
			token_source: None,
			requests_per_sec: 0.,
			burst: 1,
			cache_enabled: false,
			cache_ttl: Self::DEFAULT_CACHE_TTL,
			cache_dir: None,
			timeout: Self::DEFAULT_TIMEOUT,
			user_agent: DEFAULT_USER_AGENT.into(),
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
			retry_base_delay: Self::DEFAULT_RETRY_BASE_DELAY,
			uncacheable_paths: DEFAULT_UNCACHEABLE_PATHS.iter().map(|p| (*p).to_owned()).collect(),
		}
	}

	/// Uses a static bearer token.
	pub fn token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.token = Some(token.into());

		self
	}

	/// Uses a refreshing token source.
	pub fn token_source(mut self, source: Arc<TokenSource>) -> Self {
		self.token_source = Some(source);

		self
	}

	/// Sets the outbound request rate.
	pub fn requests_per_sec(mut self, rate: f64) -> Self {
		self.requests_per_sec = rate;

		self
	}

	/// Sets the rate limiter burst capacity.
	pub fn burst(mut self, burst: u32) -> Self {
		self.burst = burst;

		self
	}

	/// Enables or disables the disk cache.
	pub fn cache(mut self, enabled: bool) -> Self {
		self.cache_enabled = enabled;

		self
	}

	/// Sets the cache lifetime.
	pub fn cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Overrides the cache directory.
	pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.cache_dir = Some(dir.into());

		self
	}

	/// Sets the per-request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Sets the `User-Agent` header.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Sets the idempotent retry budget.
	pub fn max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts;

		self
	}

	/// Sets the first backoff delay.
	pub fn retry_base_delay(mut self, delay: StdDuration) -> Self {
		self.retry_base_delay = delay;

		self
	}

	/// Replaces the uncacheable path prefixes.
	pub fn uncacheable_paths<I, S>(mut self, paths: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.uncacheable_paths = paths.into_iter().map(Into::into).collect();

		self
	}

	/// Validates the settings.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let mut base_url = Url::parse(&self.base_url)
			.map_err(|source| ConfigError::InvalidUrl { value: self.base_url.clone(), source })?;

		if base_url.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase(self.base_url));
		}
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		base_url.set_query(None);
		base_url.set_fragment(None);

		let credentials = match (self.token, self.token_source) {
			(Some(_), Some(_)) => return Err(ConfigError::ConflictingCredentials),
			(Some(token), None) => Credentials::Static(token),
			(None, Some(source)) => Credentials::Source(source),
			(None, None) => Credentials::Anonymous,
		};

		if !self.requests_per_sec.is_finite() || self.requests_per_sec < 0. {
			return Err(ConfigError::InvalidRate(self.requests_per_sec));
		}

		Ok(ClientConfig {
			base_url,
			credentials,
			requests_per_sec: self.requests_per_sec,
			burst: self.burst.max(1),
			cache_enabled: self.cache_enabled,
			cache_ttl: self.cache_ttl,
			cache_dir: self.cache_dir,
			timeout: self.timeout,
			user_agent: self.user_agent,
			max_attempts: self.max_attempts.max(1),
			retry_base_delay: self.retry_base_delay,
			uncacheable_paths: self.uncacheable_paths,
		})
	}
}
