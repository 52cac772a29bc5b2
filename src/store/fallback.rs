//! Preferred-backend-then-file [`TokenStore`] composition.

// self
use crate::{
	_prelude::*,
	auth::{InstanceName, Token},
	store::{FileStore, KeychainStore, StoreError, StoreFuture, TokenStore, keychain},
};

/// Tries a preferred backend first and transparently falls back to a [`FileStore`].
///
/// The preferred backend is probed once at construction; a backend that fails the probe is
/// skipped for the lifetime of the store. Runtime failures of the preferred backend are logged and
/// the call is retried against the file store.
#[derive(Clone)]
pub struct FallbackStore {
	primary: Option<Arc<dyn TokenStore>>,
	fallback: FileStore,
}
impl FallbackStore {
	/// Probes `primary` and composes it in front of `fallback`.
	pub async fn new(primary: Arc<dyn TokenStore>, fallback: FileStore) -> Self {
		match primary.probe().await {
			Ok(()) => Self { primary: Some(primary), fallback },
			Err(e) => {
				tracing::warn!(
					backend = primary.backend(),
					error = %e,
					"preferred token backend unavailable, using file store",
				);

				Self::file_only(fallback)
			},
		}
	}

	/// Prefers the OS keychain and falls back to token files under the per-user config directory.
	pub async fn open_default() -> Result<Self, StoreError> {
		let file = FileStore::open_default()?;

		Ok(Self::new(Arc::new(KeychainStore::new(keychain::DEFAULT_SERVICE)), file).await)
	}

	/// Builds a store that only uses the file backend.
	pub fn file_only(fallback: FileStore) -> Self {
		Self { primary: None, fallback }
	}

	/// Returns `true` when the preferred backend passed its probe.
	pub fn has_primary(&self) -> bool {
		self.primary.is_some()
	}

	fn degrade(primary: &dyn TokenStore, op: &'static str, err: &StoreError) {
		tracing::warn!(
			backend = primary.backend(),
			op,
			error = %err,
			"preferred token backend failed, falling back to file store",
		);
	}
}
impl Debug for FallbackStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FallbackStore")
			.field("primary", &self.primary.as_ref().map(|p| p.backend()))
			.field("fallback", &self.fallback)
			.finish()
	}
}
impl TokenStore for FallbackStore {
	fn backend(&self) -> &'static str {
		match &self.primary {
			Some(primary) => primary.backend(),
			None => self.fallback.backend(),
		}
	}

	fn save<'a>(&'a self, token: &'a Token) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			if let Some(primary) = &self.primary {
				match primary.save(token).await {
					Ok(()) => return Ok(()),
					Err(e) => Self::degrade(primary.as_ref(), "save", &e),
				}
			}

			self.fallback.save(token).await
		})
	}

	fn load<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, Token> {
		Box::pin(async move {
			if let Some(primary) = &self.primary {
				match primary.load(instance).await {
					Ok(token) => return Ok(token),
					Err(e) if e.is_not_found() => {},
					Err(e) => Self::degrade(primary.as_ref(), "load", &e),
				}
			}

			self.fallback.load(instance).await
		})
	}

	fn delete<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut removed = false;

			if let Some(primary) = &self.primary {
				match primary.delete(instance).await {
					Ok(()) => removed = true,
					Err(e) if e.is_not_found() => {},
					Err(e) => Self::degrade(primary.as_ref(), "delete", &e),
				}
			}

			match self.fallback.delete(instance).await {
				Ok(()) => Ok(()),
				Err(e) if e.is_not_found() && removed => Ok(()),
				Err(e) => Err(e),
			}
		})
	}
}
