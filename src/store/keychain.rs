//! OS keychain [`TokenStore`] backed by the platform credential service.

// crates.io
use keyring::Entry;
// self
use crate::{
	_prelude::*,
	auth::{InstanceName, Token},
	store::{StoreError, StoreFuture, TokenStore, file::TokenFile},
};

/// Keychain service name under which tokens are filed.
pub const DEFAULT_SERVICE: &str = "lms-api";

const PROBE_ACCOUNT: &str = ".lms-api-probe";

type EntryFactory = Arc<dyn Fn(&str, &str) -> keyring::Result<Entry> + Send + Sync>;

/// Stores one keychain credential per instance, holding the same JSON payload as the file backend.
///
/// [`probe`](TokenStore::probe) writes, reads back, and deletes a scratch credential, so a
/// keychain that is present but locked or unreachable is detected before any token is trusted to
/// it.
#[derive(Clone)]
pub struct KeychainStore {
	service: String,
	entries: EntryFactory,
}
impl KeychainStore {
	/// Uses the platform keychain under `service`.
	pub fn new(service: impl Into<String>) -> Self {
		Self::with_entry_factory(service, Entry::new)
	}

	/// Builds keychain entries through `factory` (`service`, `account`) instead of the platform
	/// default credential builder.
	pub fn with_entry_factory<F>(service: impl Into<String>, factory: F) -> Self
	where
		F: 'static + Fn(&str, &str) -> keyring::Result<Entry> + Send + Sync,
	{
		Self { service: service.into(), entries: Arc::new(factory) }
	}

	/// Keychain service name.
	pub fn service(&self) -> &str {
		&self.service
	}

	fn entry(&self, account: &str) -> Result<Entry, StoreError> {
		(self.entries)(&self.service, account).map_err(|e| keychain_error(account, e))
	}

	fn probe_now(&self) -> Result<(), StoreError> {
		let entry = self.entry(PROBE_ACCOUNT)?;
		let nonce = format!("{:016x}", rand::random::<u64>());

		entry.set_password(&nonce).map_err(|e| keychain_error(PROBE_ACCOUNT, e))?;

		let read = entry.get_password().map_err(|e| keychain_error(PROBE_ACCOUNT, e));
		let _ = entry.delete_credential();

		if read? == nonce {
			Ok(())
		} else {
			Err(StoreError::Backend { message: "Keychain returned a different secret".into() })
		}
	}

	fn save_now(&self, token: &Token) -> Result<(), StoreError> {
		let payload = serde_json::to_string(&TokenFile::from_token(token)).map_err(|e| {
			StoreError::Serialization {
				message: format!("Failed to serialize token for {}: {e}", token.instance),
			}
		})?;

		self.entry(&token.instance)?
			.set_password(&payload)
			.map_err(|e| keychain_error(&token.instance, e))
	}

	fn load_now(&self, instance: &InstanceName) -> Result<Token, StoreError> {
		let payload =
			self.entry(instance)?.get_password().map_err(|e| keychain_error(instance, e))?;

		TokenFile::parse(instance, payload.as_bytes()).map_err(|message| {
			StoreError::Serialization {
				message: format!("Failed to parse keychain token for {instance}: {message}"),
			}
		})
	}

	fn delete_now(&self, instance: &InstanceName) -> Result<(), StoreError> {
		self.entry(instance)?.delete_credential().map_err(|e| keychain_error(instance, e))
	}
}
impl Debug for KeychainStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeychainStore").field("service", &self.service).finish()
	}
}
impl TokenStore for KeychainStore {
	fn backend(&self) -> &'static str {
		"keychain"
	}

	fn probe(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.probe_now() })
	}

	fn save<'a>(&'a self, token: &'a Token) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.save_now(token) })
	}

	fn load<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, Token> {
		Box::pin(async move { self.load_now(instance) })
	}

	fn delete<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.delete_now(instance) })
	}
}

fn keychain_error(account: &str, err: keyring::Error) -> StoreError {
	match err {
		keyring::Error::NoEntry => StoreError::NotFound { instance: account.to_owned() },
		keyring::Error::BadEncoding(_) => StoreError::Serialization {
			message: format!("Keychain secret for {account} is not UTF-8"),
		},
		err => StoreError::Backend { message: format!("Keychain failure for {account}: {err}") },
	}
}
