//! Responses returned by the API client, including cache hits and merged pages.

// crates.io
use reqwest::{StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
// self
use crate::_prelude::*;

/// Successful API response, possibly merged from several pages or served from the disk cache.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Status of the final network response; `200 OK` for cache hits.
	pub status: StatusCode,
	/// Headers of the final network response; empty for cache hits.
	pub headers: HeaderMap,
	/// Raw body. For paginated requests this is the merged JSON array.
	pub body: Vec<u8>,
	/// `true` when the body came from the disk cache.
	pub from_cache: bool,
	/// Pages fetched from the network.
	pub pages: u32,
	/// HTTP attempts made, including retries.
	pub attempts: u32,
	pub(crate) endpoint: String,
}
impl ApiResponse {
	pub(crate) fn cached(endpoint: String, body: Vec<u8>) -> Self {
		Self {
			status: StatusCode::OK,
			headers: HeaderMap::new(),
			body,
			from_cache: true,
			pages: 0,
			attempts: 0,
			endpoint,
		}
	}

	/// Method and path that produced the response.
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		decode(&self.endpoint, &self.body)
	}

	/// Body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

pub(crate) fn decode<T>(endpoint: &str, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::Decode { endpoint: endpoint.to_owned(), source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Course {
		id: u64,
		name: String,
	}

	#[test]
	fn json_decodes_and_reports_paths() {
		let response = ApiResponse::cached(
			"GET /api/v1/courses".into(),
			br#"[{"id":1,"name":"Rust"},{"id":"two","name":"Go"}]"#.to_vec(),
		);
		let err = response.json::<Vec<Course>>().expect_err("Second id is not a number.");

		match err {
			Error::Decode { endpoint, source } => {
				assert_eq!(endpoint, "GET /api/v1/courses");
				assert_eq!(source.path().to_string(), "[1].id");
			},
			other => panic!("Unexpected error: {other:?}."),
		}

		let ok = ApiResponse::cached("GET /x".into(), br#"{"id":7,"name":"Intro"}"#.to_vec());
		let course = ok.json::<Course>().expect("Object should decode.");

		assert_eq!((course.id, course.name.as_str()), (7, "Intro"));
		assert_eq!(ok.text(), r#"{"id":7,"name":"Intro"}"#);
		assert!(ok.from_cache);
	}
}
