//! Refresh-token grant plumbing built on the `oauth2` crate.

pub use oauth2;

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::Token,
	error::{ConfigError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<Token>> + 'a + Send>>;

/// Exchanges a refresh token for new token material.
///
/// Implementations perform exactly one network exchange per call and never touch storage.
/// Persistence and single-flight coordination belong to
/// [`TokenSource`](crate::source::TokenSource).
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Redeems `current.refresh_token`, returning the replacement token for the same instance.
	fn refresh<'a>(&'a self, current: &'a Token) -> RefreshFuture<'a>;
}

/// Token-endpoint settings for [`OAuth2Refresher`].
#[derive(Clone, Debug)]
pub struct OAuth2Config {
	/// Token endpoint (e.g. `https://lms.example.edu/login/oauth2/token`).
	pub token_url: Url,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret, sent in the request body.
	pub client_secret: Option<String>,
	/// Timeout applied to the refresh call.
	pub timeout: StdDuration,
	/// User agent sent to the token endpoint.
	pub user_agent: String,
}
impl OAuth2Config {
	const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

	/// Creates settings for a public client.
	pub fn new(token_url: Url, client_id: impl Into<String>) -> Self {
		Self {
			token_url,
			client_id: client_id.into(),
			client_secret: None,
			timeout: Self::DEFAULT_TIMEOUT,
			user_agent: crate::client::DEFAULT_USER_AGENT.into(),
		}
	}

	/// Adds a confidential client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the refresh timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}
}

/// [`TokenRefresher`] performing `grant_type=refresh_token` against an OAuth 2.0 token endpoint.
pub struct OAuth2Refresher {
	token_url: Url,
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
}
impl OAuth2Refresher {
	/// Builds a refresher with its own reqwest client.
	pub fn new(config: &OAuth2Config) -> Result<Self> {
		let http_client = ReqwestHttpClient::build(&config.user_agent, config.timeout)?;

		Self::with_http_client(config, http_client)
	}

	/// Builds a refresher that reuses `http_client`.
	pub fn with_http_client(config: &OAuth2Config, http_client: ReqwestHttpClient) -> Result<Self> {
		let token_url = TokenUrl::new(config.token_url.to_string()).map_err(|source| {
			ConfigError::InvalidUrl { value: config.token_url.to_string(), source }
		})?;
		let mut oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = &config.client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.clone()));
		}

		Ok(Self { token_url: config.token_url.clone(), oauth_client, http_client })
	}
}
impl Debug for OAuth2Refresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Refresher")
			.field("token_url", &self.token_url.as_str())
			.finish()
	}
}
impl TokenRefresher for OAuth2Refresher {
	fn refresh<'a>(&'a self, current: &'a Token) -> RefreshFuture<'a> {
		Box::pin(async move {
			let refresh_token = current.refresh_token.as_ref().ok_or_else(|| Error::AuthExpired {
				reason: "no refresh token is stored".into(),
				status: None,
			})?;
			let meta = ResponseMetadataSlot::default();
			let instrumented = self.http_client.instrumented(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err))?;

			map_refresh_response(current, response)
		})
	}
}

fn map_refresh_response(current: &Token, response: BasicTokenResponse) -> Result<Token> {
	let mut token = Token::new(current.instance.clone(), response.access_token().secret().as_str());

	// Providers that do not rotate refresh tokens omit them from the response.
	token.refresh_token = match response.refresh_token() {
		Some(rotated) => Some(rotated.secret().as_str().into()),
		None => current.refresh_token.clone(),
	};

	if let Some(expires_in) = response.expires_in() {
		let secs = i64::try_from(expires_in.as_secs()).map_err(|_| Error::AuthExpired {
			reason: "token endpoint returned an out-of-range expires_in".into(),
			status: None,
		})?;

		token = token.expires_at(OffsetDateTime::now_utc() + Duration::seconds(secs));
	}

	Ok(token)
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(status, response),
		RequestTokenError::Request(HttpClientError::Reqwest(inner)) =>
			if inner.is_timeout() {
				Error::AuthExpired {
					reason: "token endpoint timed out".into(),
					status: status.or_else(|| inner.status().map(|code| code.as_u16())),
				}
			} else {
				TransportError::network("POST token endpoint", *inner).into()
			},
		RequestTokenError::Request(HttpClientError::Io(inner)) => TransportError::Io(inner).into(),
		RequestTokenError::Request(other) =>
			Error::AuthExpired { reason: format!("HTTP client error: {other}"), status },
		RequestTokenError::Parse(error, _body) => Error::AuthExpired {
			reason: format!("token endpoint returned malformed JSON: {error}"),
			status,
		},
		RequestTokenError::Other(message) =>
			Error::AuthExpired { reason: format!("unexpected token response: {message}"), status },
	}
}

fn map_server_response_error(status: Option<u16>, response: BasicErrorResponse) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_string(),
	};

	Error::AuthExpired { reason, status }
}
