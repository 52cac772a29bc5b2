//! Shared API-access core for LMS command-line tooling: a rate-limited, disk-cached REST client
//! with single-flight OAuth 2.0 token refresh, retry-on-401, and Link-header pagination.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod cancel;
pub mod client;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod paths;
pub mod rate_limit;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{InstanceName, Token},
		store::{MemoryStore, TokenStore},
	};

	/// Instance name used across test fixtures.
	pub fn test_instance() -> InstanceName {
		InstanceName::new("school").expect("Fixture instance name should be valid.")
	}

	/// Builds a reqwest client suitable for talking to a local `httpmock` server.
	pub fn test_reqwest_http_client() -> crate::http::ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build Reqwest client for tests.");

		crate::http::ReqwestHttpClient::with_client(client)
	}

	/// Returns an in-memory store pre-populated with `token`.
	pub async fn seeded_memory_store(token: &Token) -> Arc<MemoryStore> {
		let store = Arc::new(MemoryStore::default());

		store.save(token).await.expect("Seeding the memory store should succeed.");

		store
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
