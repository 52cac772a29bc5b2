// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use time::Duration;
// self
use lms_api::{
	auth::{InstanceName, Token},
	cancel::CancelToken,
	error::Error,
	oauth::OAuth2Config,
	source::{TokenSource, TokenSourceConfig},
	store::{FallbackStore, FileStore, MemoryStore, StoreError, StoreFuture, TokenStore},
	url::Url,
};

struct UnavailableKeyring;
impl TokenStore for UnavailableKeyring {
	fn backend(&self) -> &'static str {
		"keyring"
	}

	fn probe(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "no session bus".into() }) })
	}

	fn save<'a>(&'a self, _token: &'a Token) -> StoreFuture<'a, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "no session bus".into() }) })
	}

	fn load<'a>(&'a self, _instance: &'a InstanceName) -> StoreFuture<'a, Token> {
		Box::pin(async { Err(StoreError::Backend { message: "no session bus".into() }) })
	}

	fn delete<'a>(&'a self, _instance: &'a InstanceName) -> StoreFuture<'a, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "no session bus".into() }) })
	}
}

fn instance() -> InstanceName {
	InstanceName::new("school").expect("Fixture instance name should be valid.")
}

fn oauth_config(server: &MockServer) -> OAuth2Config {
	let token_url =
		Url::parse(&server.url("/login/oauth2/token")).expect("Mock token URL should parse.");

	OAuth2Config::new(token_url, "client-id").with_client_secret("client-secret")
}

fn expiring_token() -> Token {
	Token::new(instance(), "access-old")
		.with_refresh_token("refresh-old")
		.expires_in(Duration::seconds(20))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_trigger_exactly_one_refresh() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/login/oauth2/token")
				.body_includes("grant_type=refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(200))
				.json_body(json!({
					"access_token": "access-new",
					"refresh_token": "refresh-new",
					"token_type": "bearer",
					"expires_in": 3600
				}));
		})
		.await;
	let store = Arc::new(MemoryStore::default());

	store.save(&expiring_token()).await.expect("Seeding the memory store should succeed.");

	let config = TokenSourceConfig::new(instance());
	let source = Arc::new(
		TokenSource::oauth2(config, store.clone(), &oauth_config(&server))
			.expect("Token source should build."),
	);
	let handles = (0..8)
		.map(|_| {
			let source = source.clone();

			tokio::spawn(async move { source.token(&CancelToken::new()).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let secret = handle
			.await
			.expect("Caller task should not panic.")
			.expect("Every caller should receive the refreshed token.");

		assert_eq!(secret.expose(), "access-new");
	}

	mock.assert_calls_async(1).await;

	assert_eq!(source.metrics().network_calls(), 1);
	assert_eq!(source.metrics().successes(), 1);
	assert_eq!(
		store.get(&instance()).map(|token| token.access_token.expose().to_owned()).as_deref(),
		Some("access-new")
	);
}

#[tokio::test]
async fn rejected_refresh_surfaces_auth_expired_and_keeps_the_stored_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth2/token");
			then.status(400).header("content-type", "application/json").json_body(json!({
				"error": "invalid_grant",
				"error_description": "refresh token revoked"
			}));
		})
		.await;
	let store = Arc::new(MemoryStore::default());

	store.save(&expiring_token()).await.expect("Seeding the memory store should succeed.");

	let config = TokenSourceConfig::new(instance());
	let source = TokenSource::oauth2(config, store.clone(), &oauth_config(&server))
		.expect("Token source should build.");
	let err = source.token(&CancelToken::new()).await.expect_err("Refresh should be rejected.");

	match err {
		Error::AuthExpired { reason, status } => {
			assert_eq!(status, Some(400));
			assert!(reason.contains("invalid_grant"));
			assert!(reason.contains("refresh token revoked"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	mock.assert_calls_async(1).await;

	let stored = store.get(&instance()).expect("Token should still be stored.");

	assert_eq!(stored.access_token.expose(), "access-old");
	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-old"));
	assert_eq!(source.metrics().failures(), 1);
}

#[tokio::test]
async fn fallback_store_persists_refreshes_to_the_file_backend() -> Result<()> {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth2/token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "access-new",
				"token_type": "bearer",
				"expires_in": 3600
			}));
		})
		.await;

	let dir = TempDir::new()?;
	let file = FileStore::open(dir.path())?;
	let store = FallbackStore::new(Arc::new(UnavailableKeyring), file.clone()).await;

	assert!(!store.has_primary());

	store.save(&expiring_token()).await?;

	let config = TokenSourceConfig::new(instance());
	let source = TokenSource::oauth2(config, Arc::new(store), &oauth_config(&server))?;
	let secret = source.token(&CancelToken::new()).await?;

	assert_eq!(secret.expose(), "access-new");

	let persisted = file.load(&instance()).await?;

	assert_eq!(persisted.access_token.expose(), "access-new");
	assert_eq!(persisted.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-old"));
	assert!(dir.path().join("school.json").is_file());

	Ok(())
}

#[tokio::test]
async fn tokens_outside_the_skew_window_are_not_refreshed() -> Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth2/token");
			then.status(500);
		})
		.await;
	let token = Token::new(instance(), "access-live")
		.with_refresh_token("refresh-live")
		.expires_in(Duration::minutes(30));
	let store = Arc::new(MemoryStore::default());

	store.save(&token).await?;

	let config = TokenSourceConfig::new(instance()).with_skew(Duration::minutes(5));
	let source = TokenSource::oauth2(config, store, &oauth_config(&server))?;

	for _ in 0..3 {
		assert_eq!(source.token(&CancelToken::new()).await?.expose(), "access-live");
	}

	mock.assert_calls_async(0).await;

	Ok(())
}
