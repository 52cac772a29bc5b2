//! Storage contracts and built-in backends for per-instance token material.
//!
//! [`FallbackStore`] composes a preferred backend (normally the OS keychain, [`KeychainStore`])
//! with a [`FileStore`] so callers never branch on which backend actually served a call.

pub mod fallback;
pub mod file;
pub mod keychain;
pub mod memory;

pub use fallback::FallbackStore;
pub use file::FileStore;
pub use keychain::KeychainStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{InstanceName, Token},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by token stores.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Short label used in logs.
	fn backend(&self) -> &'static str;

	/// Checks that the backend is usable; the default implementation always succeeds.
	fn probe(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	/// Persists or replaces the token for `token.instance`.
	fn save<'a>(&'a self, token: &'a Token) -> StoreFuture<'a, ()>;

	/// Loads the token for `instance`, failing with [`StoreError::NotFound`] when absent.
	fn load<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, Token>;

	/// Removes the token for `instance`, failing with [`StoreError::NotFound`] when absent.
	fn delete<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// No token is stored for the instance.
	#[error("No token is stored for instance `{instance}`.")]
	NotFound {
		/// Instance that was looked up.
		instance: String,
	},
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	pub(crate) fn not_found(instance: &InstanceName) -> Self {
		Self::NotFound { instance: instance.to_string() }
	}

	/// Returns `true` for [`StoreError::NotFound`].
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}
