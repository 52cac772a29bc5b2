//! Client-level error taxonomy shared by the rate limiter, cache, token source, and API client.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error surfaced by the API-access core.
///
/// Transient conditions (rate-limit waits, cache misses, corrupt cache files, a single 401, or
/// idempotent 429/5xx within the retry budget) are resolved internally and never appear here.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Response cache management failure.
	#[error(transparent)]
	Cache(#[from] crate::cache::CacheError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The access token could not be refreshed; the stored token is left untouched.
	#[error("Access token expired and could not be refreshed: {reason}.")]
	AuthExpired {
		/// Provider- or client-supplied reason string.
		reason: String,
		/// HTTP status returned by the token endpoint, when available.
		status: Option<u16>,
	},
	/// The API rejected the request even after a freshly refreshed token.
	#[error("{endpoint} was rejected as unauthorized after {attempts} attempt(s).")]
	Unauthorized {
		/// Method and path of the failing request.
		endpoint: String,
		/// Number of HTTP attempts made.
		attempts: u32,
		/// Response body returned by the API.
		body: String,
	},
	/// The requested resource does not exist.
	#[error("{endpoint} was not found.")]
	NotFound {
		/// Method and path of the failing request.
		endpoint: String,
		/// Response body returned by the API.
		body: String,
	},
	/// The caller lacks permission for the requested resource.
	#[error("{endpoint} is forbidden for the current credentials.")]
	Forbidden {
		/// Method and path of the failing request.
		endpoint: String,
		/// Response body returned by the API.
		body: String,
	},
	/// The API kept answering 429 until the retry budget ran out.
	#[error("{endpoint} was rate limited after {attempts} attempt(s).")]
	RateLimited {
		/// Method and path of the failing request.
		endpoint: String,
		/// Number of HTTP attempts made.
		attempts: u32,
		/// Retry-After hint from the last response, if supplied.
		retry_after: Option<Duration>,
		/// Response body returned by the API.
		body: String,
	},
	/// The API kept failing with 5xx until the retry budget ran out.
	#[error("{endpoint} failed with server error {status} after {attempts} attempt(s).")]
	ServerError {
		/// HTTP status code of the last response.
		status: u16,
		/// Method and path of the failing request.
		endpoint: String,
		/// Number of HTTP attempts made.
		attempts: u32,
		/// Response body returned by the API.
		body: String,
	},
	/// Any other non-success response.
	#[error("{endpoint} failed with status {status}.")]
	Api {
		/// HTTP status code of the response.
		status: u16,
		/// Method and path of the failing request.
		endpoint: String,
		/// Response body returned by the API.
		body: String,
	},
	/// The caller cancelled the operation.
	#[error("Operation was cancelled.")]
	Cancelled,
	/// A response body could not be decoded.
	#[error("Response from {endpoint} could not be decoded.")]
	Decode {
		/// Method and path of the request.
		endpoint: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A request body could not be encoded.
	#[error("Request body for {endpoint} could not be encoded.")]
	Encode {
		/// Method and path of the request.
		endpoint: String,
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
}
impl Error {
	/// Returns the HTTP status associated with the failure, when one applies.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::AuthExpired { status, .. } => *status,
			Self::Unauthorized { .. } => Some(401),
			Self::NotFound { .. } => Some(404),
			Self::Forbidden { .. } => Some(403),
			Self::RateLimited { .. } => Some(429),
			Self::ServerError { status, .. } | Self::Api { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Returns the response body carried by API failures.
	pub fn body(&self) -> Option<&str> {
		match self {
			Self::Unauthorized { body, .. }
			| Self::NotFound { body, .. }
			| Self::Forbidden { body, .. }
			| Self::RateLimited { body, .. }
			| Self::ServerError { body, .. }
			| Self::Api { body, .. } => Some(body),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised while building clients.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL or request path cannot be parsed.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL cannot carry relative paths.
	#[error("Base URL `{0}` cannot be used as a base.")]
	CannotBeABase(String),
	/// A static token and a token source were both configured.
	#[error("A static token and a token source are mutually exclusive.")]
	ConflictingCredentials,
	/// Rate must be finite and non-negative.
	#[error("Requests per second must be finite and non-negative, got {0}.")]
	InvalidRate(f64),
	/// Instance name failed validation.
	#[error(transparent)]
	InvalidInstance(#[from] crate::auth::IdentifierError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Method and path of the request.
		endpoint: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint: endpoint.into(), source: Box::new(src) }
	}
}
