//! Versioned, filesystem-safe cache key derivation.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::Method;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Schema prefix embedded in every digest and file name. Bump it whenever key derivation or the
/// entry layout changes so old entries can never be served under new semantics.
pub const CACHE_SCHEMA: &str = "v1";

/// Canonical cache key for a request: method plus absolute URL with query pairs sorted and the
/// fragment dropped. `variant` distinguishes requests that share a URL but not a result (e.g.
/// different pagination limits).
pub fn request_key(method: &Method, url: &Url, variant: Option<&str>) -> String {
	let mut canonical = url.clone();
	let mut pairs: Vec<(String, String)> =
		url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

	pairs.sort();
	canonical.set_fragment(None);

	if pairs.is_empty() {
		canonical.set_query(None);
	} else {
		canonical.query_pairs_mut().clear().extend_pairs(pairs);
	}

	match variant {
		Some(variant) => format!("{method} {canonical}#{variant}"),
		None => format!("{method} {canonical}"),
	}
}

/// File name for a cache key: `<schema>-<base64url(sha256(schema:key))>.json`.
pub fn file_name(key: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(CACHE_SCHEMA.as_bytes());
	hasher.update(b":");
	hasher.update(key.as_bytes());

	format!("{CACHE_SCHEMA}-{}.json", URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Fixture URL should parse.")
	}

	#[test]
	fn query_order_does_not_change_the_key() {
		let a = request_key(
			&Method::GET,
			&url("https://lms.example.edu/api/v1/courses?per_page=50&include[]=term#frag"),
			None,
		);
		let b = request_key(
			&Method::GET,
			&url("https://lms.example.edu/api/v1/courses?include[]=term&per_page=50"),
			None,
		);

		assert_eq!(a, b);
		assert!(a.starts_with("GET https://lms.example.edu/api/v1/courses?"));
	}

	#[test]
	fn method_and_variant_partition_keys() {
		let target = url("https://lms.example.edu/api/v1/courses");

		assert_ne!(request_key(&Method::GET, &target, None), request_key(&Method::HEAD, &target, None));
		assert_ne!(
			request_key(&Method::GET, &target, Some("limit=10")),
			request_key(&Method::GET, &target, Some("limit=20")),
		);
	}

	#[test]
	fn file_names_are_stable_and_safe() {
		let name = file_name("GET https://lms.example.edu/api/v1/courses");

		assert_eq!(name, file_name("GET https://lms.example.edu/api/v1/courses"));
		assert!(name.starts_with("v1-"));
		assert!(name.ends_with(".json"));
		assert!(
			name.trim_end_matches(".json")
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
		);
		assert_ne!(name, file_name("GET https://lms.example.edu/api/v1/users"));
	}
}
