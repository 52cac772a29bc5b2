//! Thread-safe in-memory [`TokenStore`] for tests and process-local sessions.

// self
use crate::{
	_prelude::*,
	auth::{InstanceName, Token},
	store::{StoreError, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<InstanceName, Token>>>;

/// Storage backend that keeps tokens in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored tokens.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no tokens are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Synchronous lookup used by tests to inspect persisted state.
	pub fn get(&self, instance: &InstanceName) -> Option<Token> {
		self.0.read().get(instance).cloned()
	}
}
impl TokenStore for MemoryStore {
	fn backend(&self) -> &'static str {
		"memory"
	}

	fn save<'a>(&'a self, token: &'a Token) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let token = token.to_owned();

		Box::pin(async move {
			map.write().insert(token.instance.clone(), token);

			Ok(())
		})
	}

	fn load<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, Token> {
		let map = self.0.clone();

		Box::pin(async move {
			map.read().get(instance).cloned().ok_or_else(|| StoreError::not_found(instance))
		})
	}

	fn delete<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(instance).map(|_| ()).ok_or_else(|| StoreError::not_found(instance))
		})
	}
}
