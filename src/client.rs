//! The shared API client: rate limiting, disk caching, bearer auth, retries, and pagination.
//!
//! Every request runs the same pipeline: acquire a rate-limit slot, consult the disk cache when the
//! request is an eligible GET, attach the current bearer token, send, then either store and
//! paginate the success or classify the failure. A 401 forces exactly one token refresh and one
//! retry. 429 and 5xx responses to GET/HEAD are retried with exponential backoff; other methods
//! are never replayed.

pub mod config;
pub mod request;
pub mod response;

pub use config::*;
pub use request::*;
pub use response::*;

// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
use reqwest::{
	Method, Response, StatusCode,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap},
};
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	cache::{DiskCache, key},
	cancel::CancelToken,
	error::{ConfigError, TransportError},
	http::{self, ReqwestHttpClient},
	obs::{self, Outcome, Stage},
	paths,
	rate_limit::RateLimiter,
};

const MAX_RETRY_AFTER: StdDuration = StdDuration::from_secs(30);

/// Long-lived client shared by every command in a run.
#[derive(Debug)]
pub struct ApiClient {
	config: ClientConfig,
	http_client: ReqwestHttpClient,
	limiter: RateLimiter,
	cache: Option<DiskCache>,
}
impl ApiClient {
	/// Builds a client from validated settings.
	///
	/// An unusable cache directory disables caching with a warning instead of failing.
	pub fn new(config: ClientConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::build(config.user_agent(), config.timeout())?;

		Ok(Self::with_http_client(config, http_client))
	}

	/// Builds a client over an existing reqwest client.
	pub fn with_http_client(config: ClientConfig, http_client: ReqwestHttpClient) -> Self {
		let limiter = RateLimiter::new(config.requests_per_sec(), config.burst());
		let cache = if config.cache_enabled() { Self::open_cache(&config) } else { None };

		Self { config, http_client, limiter, cache }
	}

	fn open_cache(config: &ClientConfig) -> Option<DiskCache> {
		let Some(dir) = config.cache_dir().cloned().or_else(paths::response_cache_dir) else {
			tracing::warn!("no per-user cache directory is available, caching disabled");

			return None;
		};

		match DiskCache::open(&dir) {
			Ok(cache) => Some(cache),
			Err(e) => {
				tracing::warn!(
					dir = %dir.display(),
					error = %e,
					"response cache unavailable, caching disabled",
				);

				None
			},
		}
	}

	/// Settings the client was built from.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Returns `true` when cacheable GETs are served from and stored into the disk cache.
	pub fn is_cache_enabled(&self) -> bool {
		self.cache.is_some()
	}

	/// Response cache, for stats and cleanup commands.
	pub fn cache(&self) -> Option<&DiskCache> {
		self.cache.as_ref()
	}

	/// Uncached GET.
	pub async fn get(&self, cancel: &CancelToken, path: &str) -> Result<ApiResponse> {
		self.execute(ApiRequest::get(path).cancel(cancel)).await
	}

	/// GET that may be served from the disk cache.
	pub async fn get_cached(&self, cancel: &CancelToken, path: &str) -> Result<ApiResponse> {
		self.execute(ApiRequest::get(path).cacheable().cancel(cancel)).await
	}

	/// POST with a JSON body.
	pub async fn post<T>(&self, cancel: &CancelToken, path: &str, body: &T) -> Result<ApiResponse>
	where
		T: ?Sized + Serialize,
	{
		self.execute(ApiRequest::new(Method::POST, path).json(body).cancel(cancel)).await
	}

	/// PUT with a JSON body.
	pub async fn put<T>(&self, cancel: &CancelToken, path: &str, body: &T) -> Result<ApiResponse>
	where
		T: ?Sized + Serialize,
	{
		self.execute(ApiRequest::new(Method::PUT, path).json(body).cancel(cancel)).await
	}

	/// DELETE.
	pub async fn delete(&self, cancel: &CancelToken, path: &str) -> Result<ApiResponse> {
		self.execute(ApiRequest::new(Method::DELETE, path).cancel(cancel)).await
	}

	/// Runs `request` through the full pipeline.
	pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let url = self.resolve(&request)?;
		let endpoint = format!("{} {}", request.method, url.path());
		let span = obs::request_span(request.method.as_str(), &endpoint);
		let body = request
			.body
			.take()
			.transpose()
			.map_err(|source| Error::Encode { endpoint: endpoint.clone(), source })?;

		async move {
			let cancel = request.cancel.clone();

			self.limiter.acquire(&cancel).await?;

			let cache_key = self.cache_key(&request, &url);

			if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
				if let Some(value) = cache.get(key) {
					tracing::debug!("cache hit");

					return Ok(ApiResponse::cached(endpoint, value));
				}

				tracing::debug!("cache miss");
			}

			let call = Call {
				method: &request.method,
				endpoint: &endpoint,
				body: body.as_deref(),
				cancel: &cancel,
			};
			let first = self.dispatch(&call, url).await?;
			let response = match request.pagination {
				Some(pagination) => self.paginate(&call, first, pagination).await?,
				None => first,
			};

			if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
				match cache.set(key, &response.body, self.config.cache_ttl()) {
					Ok(()) => tracing::debug!("response cached"),
					Err(e) => tracing::warn!(error = %e, "response could not be cached"),
				}
			}

			Ok(response)
		}
		.instrument(span)
		.await
	}

	fn resolve(&self, request: &ApiRequest) -> Result<Url> {
		let path = request.path.trim_start_matches('/');
		let mut url = self
			.config
			.base_url()
			.join(path)
			.map_err(|source| ConfigError::InvalidUrl { value: request.path.clone(), source })?;

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&request.query);
		}

		Ok(url)
	}

	fn cache_key(&self, request: &ApiRequest, url: &Url) -> Option<String> {
		if self.cache.is_none()
			|| !request.cacheable
			|| request.method != Method::GET
			|| self.config.is_uncacheable(&request.path)
		{
			return None;
		}

		let variant = request.pagination.map(Pagination::cache_variant);

		Some(key::request_key(&request.method, url, variant.as_deref()))
	}

	async fn bearer(&self, cancel: &CancelToken) -> Result<Option<TokenSecret>> {
		match self.config.credentials() {
			Credentials::Anonymous => Ok(None),
			Credentials::Static(token) => Ok(Some(token.clone())),
			Credentials::Source(source) => source.token(cancel).await.map(Some),
		}
	}

	// Sends one logical request: auth, the single 401 refresh-and-retry, and idempotent backoff.
	// The caller has already acquired the rate-limit slot for the first attempt.
	async fn dispatch(&self, call: &Call<'_>, url: Url) -> Result<ApiResponse> {
		let idempotent = matches!(*call.method, Method::GET | Method::HEAD);
		let max_attempts = self.config.max_attempts();
		let mut token = self.bearer(call.cancel).await?;
		let mut refreshed = false;
		let mut attempts = 0;

		loop {
			if attempts > 0 {
				self.limiter.acquire(call.cancel).await?;
			}

			attempts += 1;
			obs::record(Stage::Request, Outcome::Attempt);

			let response = self.send(call, &url, token.as_ref()).await?;
			let status = response.status();
			let headers = response.headers().clone();

			if status.is_success() {
				let body = self.read_body(call, response).await?;

				obs::record(Stage::Request, Outcome::Success);

				return Ok(ApiResponse {
					status,
					headers,
					body,
					from_cache: false,
					pages: 1,
					attempts,
					endpoint: call.endpoint.to_owned(),
				});
			}

			let body = String::from_utf8_lossy(&self.read_body(call, response).await?).into_owned();

			if let (StatusCode::UNAUTHORIZED, false, Credentials::Source(source), Some(stale)) =
				(status, refreshed, self.config.credentials(), token.as_ref())
			{
				tracing::debug!("access token rejected, forcing one refresh");
				obs::record(Stage::Request, Outcome::Retry);

				token = Some(source.force_refresh(stale, call.cancel).await?);
				refreshed = true;

				continue;
			}

			let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
			let retry_after = http::parse_retry_after(&headers);

			if retryable && idempotent && attempts < max_attempts {
				let delay = self.backoff(attempts, retry_after);

				tracing::debug!(
					status = status.as_u16(),
					attempt = attempts,
					delay_ms = delay.as_millis() as u64,
					"retrying after transient failure",
				);
				obs::record(Stage::Request, Outcome::Retry);

				tokio::select! {
					biased;
					_ = call.cancel.cancelled() => return Err(Error::Cancelled),
					_ = tokio::time::sleep(delay) => {},
				}

				continue;
			}

			obs::record(Stage::Request, Outcome::Failure);

			return Err(classify(status, call.endpoint, attempts, retry_after, body));
		}
	}

	async fn send(
		&self,
		call: &Call<'_>,
		url: &Url,
		token: Option<&TokenSecret>,
	) -> Result<Response> {
		let mut builder = self
			.http_client
			.request(call.method.clone(), url.clone())
			.header(ACCEPT, "application/json");

		if let Some(token) = token {
			builder = builder.header(AUTHORIZATION, token.bearer());
		}
		if let Some(body) = call.body {
			builder = builder.header(CONTENT_TYPE, "application/json").body(body.to_vec());
		}

		call.cancel
			.run(async {
				builder
					.send()
					.await
					.map_err(|e| TransportError::network(call.endpoint, e).into())
			})
			.await
	}

	async fn read_body(&self, call: &Call<'_>, response: Response) -> Result<Vec<u8>> {
		call.cancel
			.run(async {
				response
					.bytes()
					.await
					.map(|bytes| bytes.to_vec())
					.map_err(|e| TransportError::network(call.endpoint, e).into())
			})
			.await
	}

	fn backoff(&self, attempts: u32, retry_after: Option<Duration>) -> StdDuration {
		if let Some(hint) = retry_after {
			return StdDuration::try_from(hint).unwrap_or_default().min(MAX_RETRY_AFTER);
		}

		let base = self.config.retry_base_delay();
		let exp = base.saturating_mul(1 << (attempts - 1).min(16));
		let jitter_ms = (base.as_millis() as u64 / 2).max(1);

		exp + StdDuration::from_millis(rand::rng().random_range(0..jitter_ms))
	}

	async fn paginate(
		&self,
		call: &Call<'_>,
		first: ApiResponse,
		pagination: Pagination,
	) -> Result<ApiResponse> {
		let limit = pagination.limit.unwrap_or(usize::MAX);
		let mut items = response::decode::<Vec<serde_json::Value>>(call.endpoint, &first.body)?;
		let mut last = first;

		while items.len() < limit {
			let Some(next) = self.next_page(&last.headers) else {
				break;
			};

			self.limiter.acquire(call.cancel).await?;

			let page = self.dispatch(call, next).await?;

			items.extend(response::decode::<Vec<serde_json::Value>>(call.endpoint, &page.body)?);
			last = ApiResponse {
				pages: last.pages + page.pages,
				attempts: last.attempts + page.attempts,
				..page
			};
		}

		items.truncate(limit);

		let body = serde_json::to_vec(&items)
			.map_err(|source| Error::Encode { endpoint: call.endpoint.to_owned(), source })?;

		tracing::debug!(pages = last.pages, items = items.len(), "pagination merged");

		Ok(ApiResponse { body, ..last })
	}

	fn next_page(&self, headers: &HeaderMap) -> Option<Url> {
		let raw = http::next_link(headers)?;
		let next = match self.config.base_url().join(&raw) {
			Ok(next) => next,
			Err(e) => {
				tracing::warn!(link = %raw, error = %e, "unparsable next link, stopping pagination");

				return None;
			},
		};

		if next.origin() != self.config.base_url().origin() {
			tracing::warn!(link = %next, "next link leaves the API origin, stopping pagination");

			return None;
		}

		Some(next)
	}
}

struct Call<'a> {
	method: &'a Method,
	endpoint: &'a str,
	body: Option<&'a [u8]>,
	cancel: &'a CancelToken,
}

fn classify(
	status: StatusCode,
	endpoint: &str,
	attempts: u32,
	retry_after: Option<Duration>,
	body: String,
) -> Error {
	let endpoint = endpoint.to_owned();

	match status {
		StatusCode::UNAUTHORIZED => Error::Unauthorized { endpoint, attempts, body },
		StatusCode::FORBIDDEN => Error::Forbidden { endpoint, body },
		StatusCode::NOT_FOUND => Error::NotFound { endpoint, body },
		StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { endpoint, attempts, retry_after, body },
		status if status.is_server_error() =>
			Error::ServerError { status: status.as_u16(), endpoint, attempts, body },
		status => Error::Api { status: status.as_u16(), endpoint, body },
	}
}
