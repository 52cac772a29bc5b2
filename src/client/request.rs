//! Request descriptions consumed by [`ApiClient::execute`](crate::client::ApiClient::execute).

// crates.io
use reqwest::Method;
// self
use crate::{_prelude::*, cancel::CancelToken};

/// Pagination behaviour for list endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
	/// Stop once this many items have been collected.
	pub limit: Option<usize>,
}
impl Pagination {
	pub(crate) fn cache_variant(self) -> String {
		match self.limit {
			Some(limit) => format!("limit={limit}"),
			None => "limit=all".into(),
		}
	}
}

/// One API request, described before it is executed.
#[derive(Debug)]
pub struct ApiRequest {
	pub(crate) method: Method,
	pub(crate) path: String,
	pub(crate) query: Vec<(String, String)>,
	pub(crate) body: Option<Result<Vec<u8>, serde_json::Error>>,
	pub(crate) cacheable: bool,
	pub(crate) pagination: Option<Pagination>,
	pub(crate) cancel: CancelToken,
}
impl ApiRequest {
	/// Starts a request for `path`, relative to the client's base URL.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: None,
			cacheable: false,
			pagination: None,
			cancel: CancelToken::new(),
		}
	}

	/// Shorthand for a GET request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Appends a query parameter.
	pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((name.into(), value.to_string()));

		self
	}

	/// Sends `body` as JSON. Encoding failures surface when the request executes.
	pub fn json<T>(mut self, body: &T) -> Self
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body));

		self
	}

	/// Marks a GET as safe to serve from and store into the disk cache.
	pub fn cacheable(mut self) -> Self {
		self.cacheable = true;

		self
	}

	/// Follows `Link: rel="next"` headers and merges every page, stopping after `limit` items.
	pub fn paginate(mut self, limit: Option<usize>) -> Self {
		self.pagination = Some(Pagination { limit });

		self
	}

	/// Binds the request to a cancellation token.
	pub fn cancel(mut self, cancel: &CancelToken) -> Self {
		self.cancel = cancel.clone();

		self
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Path relative to the base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Returns `true` when the caller opted into caching.
	pub fn is_cacheable(&self) -> bool {
		self.cacheable
	}

	/// Pagination settings, if any.
	pub fn pagination(&self) -> Option<Pagination> {
		self.pagination
	}
}
