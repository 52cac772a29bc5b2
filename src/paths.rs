//! Per-user directory discovery for token files and cached responses.

// std
use std::path::PathBuf;

/// Directory name used under the platform config/cache roots.
pub const APP_DIR: &str = "lms-api";

/// Per-user configuration directory (`~/.config/lms-api` on Linux).
pub fn config_dir() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Directory holding one token file per instance.
pub fn token_dir() -> Option<PathBuf> {
	config_dir().map(|dir| dir.join("tokens"))
}

/// Directory holding cached API responses (`~/.cache/lms-api/responses` on Linux).
pub fn response_cache_dir() -> Option<PathBuf> {
	dirs::cache_dir().map(|dir| dir.join(APP_DIR).join("responses"))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn directories_are_namespaced() {
		if let Some(dir) = token_dir() {
			assert!(dir.ends_with("lms-api/tokens"));
		}
		if let Some(dir) = response_cache_dir() {
			assert!(dir.ends_with("lms-api/responses"));
		}
	}
}
