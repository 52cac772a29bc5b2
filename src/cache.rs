//! File-backed response cache with per-entry expiration and aggregate statistics.
//!
//! Every entry lives in its own JSON file (`{"value": <base64 bytes>, "expiration": <RFC 3339>}`)
//! named by [`key::file_name`]. Writes go through a temporary file and an atomic rename so readers
//! never observe partial entries. Reads never delete: expired entries stay on disk until
//! [`DiskCache::clear_expired`] or [`DiskCache::clear`] sweeps them. Unreadable or corrupt files
//! are treated as misses and excluded from statistics, never guess-deleted.

pub mod key;

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	obs::{self, Outcome, Stage},
};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cache-management failures; read paths never surface these.
#[derive(Debug, ThisError)]
pub enum CacheError {
	/// Filesystem failure on the cache directory or an entry.
	#[error("Cache I/O failed on {path}: {source}.")]
	Io {
		/// Path being accessed.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// An entry could not be encoded or decoded.
	#[error("Cache entry {path} is corrupt: {message}.")]
	Corrupt {
		/// Path of the offending entry.
		path: PathBuf,
		/// Parser message.
		message: String,
	},
}
impl CacheError {
	fn io(path: &Path, source: std::io::Error) -> Self {
		Self::Io { path: path.to_path_buf(), source }
	}
}

/// Aggregate counts over all parseable on-disk entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
	/// Active plus expired entries.
	pub total: usize,
	/// Entries whose expiration is still in the future.
	pub active: usize,
	/// Entries whose expiration has passed.
	pub expired: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
	#[serde(with = "base64_bytes")]
	value: Vec<u8>,
	#[serde(with = "time::serde::rfc3339")]
	expiration: OffsetDateTime,
}
impl CacheEntry {
	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expiration > now
	}
}

mod base64_bytes {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::STANDARD};
	use serde::{Deserialize, Deserializer, Serializer, de::Error as DeError};

	pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&STANDARD.encode(value))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		STANDARD.decode(raw.as_bytes()).map_err(DeError::custom)
	}
}

/// Disk-backed key/value store for response bodies.
#[derive(Clone, Debug)]
pub struct DiskCache {
	dir: PathBuf,
}
impl DiskCache {
	/// Opens (or creates) a cache rooted at `dir`.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

		Ok(Self { dir })
	}

	/// Directory holding the entry files.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Returns the value only if the entry exists, parses, and has not expired.
	pub fn get(&self, key: &str) -> Option<Vec<u8>> {
		let path = self.entry_path(key);
		let entry = match Self::read_entry(&path) {
			Ok(Some(entry)) => entry,
			Ok(None) => {
				obs::record(Stage::Cache, Outcome::Miss);

				return None;
			},
			Err(e) => {
				tracing::warn!(error = %e, "ignoring unreadable cache entry");
				obs::record(Stage::Cache, Outcome::Miss);

				return None;
			},
		};

		if entry.is_live_at(OffsetDateTime::now_utc()) {
			obs::record(Stage::Cache, Outcome::Hit);

			Some(entry.value)
		} else {
			tracing::debug!(expiration = %entry.expiration, "cache entry expired");
			obs::record(Stage::Cache, Outcome::Miss);

			None
		}
	}

	/// Writes or overwrites `key`, stamping `expiration = now + ttl`.
	pub fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
		let entry =
			CacheEntry { value: value.to_vec(), expiration: OffsetDateTime::now_utc() + ttl };
		let path = self.entry_path(key);
		let serialized = serde_json::to_vec(&entry)
			.map_err(|e| CacheError::Corrupt { path: path.clone(), message: e.to_string() })?;

		self.write_atomically(&path, &serialized)
	}

	/// Existence probe that ignores expiration.
	pub fn has(&self, key: &str) -> bool {
		self.entry_path(key).is_file()
	}

	/// Scans the directory once, classifying each parseable entry as active or expired.
	pub fn stats(&self) -> Result<CacheStats, CacheError> {
		let now = OffsetDateTime::now_utc();
		let mut stats = CacheStats::default();

		for path in self.entry_files()? {
			match Self::read_entry(&path) {
				Ok(Some(entry)) => {
					stats.total += 1;

					if entry.is_live_at(now) {
						stats.active += 1;
					} else {
						stats.expired += 1;
					}
				},
				Ok(None) => {},
				Err(e) => tracing::warn!(error = %e, "skipping unreadable cache entry"),
			}
		}

		Ok(stats)
	}

	/// Removes every entry unconditionally, returning how many files were deleted.
	pub fn clear(&self) -> Result<usize, CacheError> {
		let mut removed = 0;

		for path in self.all_files()? {
			if Self::remove(&path)? {
				removed += 1;
			}
		}

		Ok(removed)
	}

	/// Removes only entries whose parsed expiration has passed; unparseable files stay untouched.
	pub fn clear_expired(&self) -> Result<usize, CacheError> {
		let now = OffsetDateTime::now_utc();
		let mut removed = 0;

		for path in self.entry_files()? {
			match Self::read_entry(&path) {
				Ok(Some(entry)) if !entry.is_live_at(now) =>
					if Self::remove(&path)? {
						removed += 1;
					},
				Ok(_) => {},
				Err(e) => tracing::warn!(error = %e, "leaving unreadable cache entry in place"),
			}
		}

		Ok(removed)
	}

	fn entry_path(&self, key: &str) -> PathBuf {
		self.dir.join(key::file_name(key))
	}

	fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(CacheError::io(path, e)),
		};
		let de = &mut serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(de)
			.map(Some)
			.map_err(|e| CacheError::Corrupt { path: path.to_path_buf(), message: e.to_string() })
	}

	fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
		fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

		let tmp_path = self.temp_path(path);
		let written = (|| {
			let mut file = File::create(&tmp_path)?;

			file.write_all(bytes)?;
			file.sync_all()?;

			fs::rename(&tmp_path, path)
		})();

		written.map_err(|e| {
			let _ = fs::remove_file(&tmp_path);

			CacheError::io(path, e)
		})
	}

	fn temp_path(&self, path: &Path) -> PathBuf {
		let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("entry");
		let unique = format!(
			".{stem}.{}.{}.{:08x}.{TEMP_EXTENSION}",
			std::process::id(),
			TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
			rand::random::<u32>(),
		);

		self.dir.join(unique)
	}

	fn all_files(&self) -> Result<Vec<PathBuf>, CacheError> {
		let entries = match fs::read_dir(&self.dir) {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(CacheError::io(&self.dir, e)),
		};
		let mut files = Vec::new();

		for entry in entries {
			let entry = entry.map_err(|e| CacheError::io(&self.dir, e))?;

			if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
				files.push(entry.path());
			}
		}

		Ok(files)
	}

	fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
		Ok(self
			.all_files()?
			.into_iter()
			.filter(|path| path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION))
			.collect())
	}

	fn remove(path: &Path) -> Result<bool, CacheError> {
		match fs::remove_file(path) {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(CacheError::io(path, e)),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::STANDARD};
	use tempfile::TempDir;
	// self
	use super::*;

	fn cache() -> (DiskCache, TempDir) {
		let dir = TempDir::new().expect("Failed to create temporary cache directory.");
		let cache = DiskCache::open(dir.path()).expect("Failed to open disk cache.");

		(cache, dir)
	}

	#[test]
	fn set_then_get_returns_live_value() {
		let (cache, _dir) = cache();

		cache.set("courses", b"[1,2,3]", Duration::minutes(5)).expect("Cache set should succeed.");

		assert_eq!(cache.get("courses"), Some(b"[1,2,3]".to_vec()));
		assert!(cache.has("courses"));
		assert!(!cache.has("users"));
	}

	#[test]
	fn expired_entries_miss_but_persist() {
		let (cache, _dir) = cache();

		cache.set("stale", b"old", -Duration::seconds(1)).expect("Cache set should succeed.");

		assert_eq!(cache.get("stale"), None);
		assert!(cache.has("stale"), "Reads must never delete expired entries.");
	}

	#[test]
	fn overwrite_refreshes_expiration() {
		let (cache, _dir) = cache();

		cache.set("k", b"first", -Duration::seconds(1)).expect("Cache set should succeed.");
		cache.set("k", b"second", Duration::minutes(1)).expect("Cache overwrite should succeed.");

		assert_eq!(cache.get("k"), Some(b"second".to_vec()));
		assert_eq!(cache.stats().expect("Stats should succeed.").total, 1);
	}

	#[test]
	fn entry_file_layout_is_json_with_rfc3339_expiration() {
		let (cache, dir) = cache();

		cache.set("layout", b"{\"id\":1}", Duration::hours(1)).expect("Cache set should succeed.");

		let raw = fs::read_to_string(dir.path().join(key::file_name("layout")))
			.expect("Entry file should exist.");
		let value: serde_json::Value = serde_json::from_str(&raw).expect("Entry should be JSON.");

		assert_eq!(value["value"], STANDARD.encode(b"{\"id\":1}"));

		let expiration = value["expiration"].as_str().expect("Expiration should be a string.");

		OffsetDateTime::parse(expiration, &time::format_description::well_known::Rfc3339)
			.expect("Expiration should be RFC 3339.");
	}

	#[test]
	fn corrupt_files_are_misses() {
		let (cache, dir) = cache();

		fs::write(dir.path().join(key::file_name("broken")), b"{\"value\":").expect("Write fixture.");

		assert_eq!(cache.get("broken"), None);
		assert!(cache.has("broken"));
	}

	#[test]
	fn no_temp_files_survive_a_write() {
		let (cache, dir) = cache();

		for i in 0..10 {
			cache.set(&format!("k{i}"), b"v", Duration::minutes(1)).expect("Cache set should succeed.");
		}

		let leftovers = fs::read_dir(dir.path())
			.expect("Cache dir should be readable.")
			.filter_map(|e| e.ok())
			.filter(|e| e.path().extension().is_some_and(|ext| ext == TEMP_EXTENSION))
			.count();

		assert_eq!(leftovers, 0);
	}
}
