// std
use std::fs;
// crates.io
use color_eyre::Result;
use tempfile::TempDir;
use time::Duration;
// self
use lms_api::cache::{CacheStats, DiskCache};

const ACTIVE: usize = 4;
const EXPIRED: usize = 3;

fn populate(cache: &DiskCache) -> Result<()> {
	for i in 0..ACTIVE {
		cache.set(&format!("active-{i}"), format!("body-{i}").as_bytes(), Duration::minutes(10))?;
	}
	for i in 0..EXPIRED {
		cache.set(&format!("expired-{i}"), b"stale", Duration::seconds(-30))?;
	}

	fs::write(cache.dir().join("v1-corrupt.json"), b"{\"value\": not json")?;

	Ok(())
}

#[test]
fn stats_classify_entries_and_skip_corrupt_files() -> Result<()> {
	let dir = TempDir::new()?;
	let cache = DiskCache::open(dir.path())?;

	populate(&cache)?;

	assert_eq!(
		cache.stats()?,
		CacheStats { total: ACTIVE + EXPIRED, active: ACTIVE, expired: EXPIRED }
	);

	for i in 0..EXPIRED {
		let key = format!("expired-{i}");

		assert!(cache.get(&key).is_none(), "Expired entries must miss.");
		assert!(cache.has(&key), "Reads must not delete expired entries.");
	}

	Ok(())
}

#[test]
fn clear_expired_removes_exactly_the_expired_entries() -> Result<()> {
	let dir = TempDir::new()?;
	let cache = DiskCache::open(dir.path())?;

	populate(&cache)?;

	assert_eq!(cache.clear_expired()?, EXPIRED);
	assert_eq!(cache.stats()?, CacheStats { total: ACTIVE, active: ACTIVE, expired: 0 });
	assert!(dir.path().join("v1-corrupt.json").is_file(), "Corrupt files are never guess-deleted.");

	for i in 0..ACTIVE {
		assert_eq!(cache.get(&format!("active-{i}")), Some(format!("body-{i}").into_bytes()));
	}

	Ok(())
}

#[test]
fn clear_removes_everything() -> Result<()> {
	let dir = TempDir::new()?;
	let cache = DiskCache::open(dir.path())?;

	populate(&cache)?;

	assert_eq!(cache.clear()?, ACTIVE + EXPIRED + 1);
	assert_eq!(cache.stats()?.total, 0);
	assert!(fs::read_dir(dir.path())?.next().is_none());

	Ok(())
}

#[test]
fn cache_survives_reopening() -> Result<()> {
	let dir = TempDir::new()?;

	let key = "GET https://lms.example.edu/api/v1/courses";

	DiskCache::open(dir.path())?.set(key, b"[]", Duration::minutes(1))?;

	let reopened = DiskCache::open(dir.path())?;

	assert_eq!(reopened.get(key), Some(b"[]".to_vec()));

	Ok(())
}
