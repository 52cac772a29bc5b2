//! OAuth token material owned by token stores.

// self
use crate::{
	_prelude::*,
	auth::{InstanceName, token::secret::TokenSecret},
};

/// Current lifecycle status for a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is valid and outside the refresh window.
	Active,
	/// Token is still valid but expires within the skew window.
	Expiring,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Access/refresh token pair bound to a named instance.
///
/// A missing `expiry` means the provider issued a non-expiring token; such tokens are only
/// refreshed when the API rejects them.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
	/// Instance the token belongs to.
	pub instance: InstanceName,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry instant reported by the provider.
	pub expiry: Option<OffsetDateTime>,
}
impl Token {
	/// Creates a token with no refresh secret and no expiry.
	pub fn new(instance: InstanceName, access_token: impl Into<TokenSecret>) -> Self {
		Self { instance, access_token: access_token.into(), refresh_token: None, expiry: None }
	}

	/// Attaches a refresh secret.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(refresh_token.into());

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expiry = Some(instant);

		self
	}

	/// Sets the expiry relative to the current clock.
	pub fn expires_in(self, duration: Duration) -> Self {
		self.expires_at(OffsetDateTime::now_utc() + duration)
	}

	/// Computes the lifecycle status at `instant` given a refresh skew window.
	pub fn status_at(&self, instant: OffsetDateTime, skew: Duration) -> TokenStatus {
		let Some(expiry) = self.expiry else {
			return TokenStatus::Active;
		};

		if instant >= expiry {
			TokenStatus::Expired
		} else if expiry - instant <= skew {
			TokenStatus::Expiring
		} else {
			TokenStatus::Active
		}
	}

	/// Returns `true` when the token should be refreshed before use.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		!matches!(self.status_at(instant, skew), TokenStatus::Active)
	}

	/// Returns `true` if the token has expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		matches!(self.status_at(OffsetDateTime::now_utc(), Duration::ZERO), TokenStatus::Expired)
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("instance", &self.instance)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expiry", &self.expiry)
			.finish()
	}
}
