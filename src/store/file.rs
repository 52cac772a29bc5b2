//! File-backed [`TokenStore`] keeping one owner-only JSON file per instance.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	auth::{InstanceName, Token, TokenSecret},
	paths,
	store::{StoreError, StoreFuture, TokenStore},
};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Serialized token payload shared by the file and keychain backends.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TokenFile {
	access_token: TokenSecret,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<TokenSecret>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	expiry: Option<OffsetDateTime>,
}
impl TokenFile {
	pub(crate) fn from_token(token: &Token) -> Self {
		Self {
			access_token: token.access_token.clone(),
			refresh_token: token.refresh_token.clone(),
			expiry: token.expiry,
		}
	}

	pub(crate) fn parse(instance: &InstanceName, bytes: &[u8]) -> Result<Token, String> {
		let de = &mut serde_json::Deserializer::from_slice(bytes);
		let file: TokenFile = serde_path_to_error::deserialize(de).map_err(|e| e.to_string())?;

		Ok(Token {
			instance: instance.clone(),
			access_token: file.access_token,
			refresh_token: file.refresh_token,
			expiry: file.expiry,
		})
	}
}

/// Persists tokens as `<dir>/<instance>.json` with `0600` permissions, replacing files atomically.
#[derive(Clone, Debug)]
pub struct FileStore {
	dir: PathBuf,
	lock: Arc<Mutex<()>>,
}
impl FileStore {
	/// Opens (or creates) a store rooted at `dir`.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let dir = dir.into();

		Self::ensure_dir(&dir)?;

		Ok(Self { dir, lock: Default::default() })
	}

	/// Opens the store under the per-user config directory.
	pub fn open_default() -> Result<Self, StoreError> {
		let dir = paths::token_dir().ok_or_else(|| StoreError::Backend {
			message: "No per-user config directory is available".into(),
		})?;

		Self::open(dir)
	}

	/// Directory holding the token files.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, instance: &InstanceName) -> PathBuf {
		self.dir.join(format!("{instance}.json"))
	}

	fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
		fs::create_dir_all(dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create token directory {}: {e}", dir.display()),
		})?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;

			fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(|e| {
				StoreError::Backend {
					message: format!("Failed to restrict {}: {e}", dir.display()),
				}
			})?;
		}

		Ok(())
	}

	fn create_private(path: &Path) -> std::io::Result<File> {
		let mut options = OpenOptions::new();

		options.write(true).create(true).truncate(true);

		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;

			options.mode(0o600);
		}

		options.open(path)
	}

	// Unique per process and call, so concurrent writers never share a temp file.
	fn temp_path(&self, instance: &InstanceName) -> PathBuf {
		self.dir.join(format!(
			".{instance}.json.{}.{}.{:08x}.tmp",
			std::process::id(),
			TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
			rand::random::<u32>(),
		))
	}

	fn save_now(&self, token: &Token) -> Result<(), StoreError> {
		let _guard = self.lock.lock();
		let path = self.path_for(&token.instance);
		let serialized = serde_json::to_vec_pretty(&TokenFile::from_token(token)).map_err(|e| {
			StoreError::Serialization {
				message: format!("Failed to serialize token for {}: {e}", token.instance),
			}
		})?;
		let tmp_path = self.temp_path(&token.instance);
		let written = Self::create_private(&tmp_path)
			.and_then(|mut file| {
				file.write_all(&serialized)?;
				file.sync_all()
			})
			.and_then(|()| fs::rename(&tmp_path, &path));

		written.map_err(|e| {
			let _ = fs::remove_file(&tmp_path);

			StoreError::Backend { message: format!("Failed to replace {}: {e}", path.display()) }
		})
	}

	fn load_now(&self, instance: &InstanceName) -> Result<Token, StoreError> {
		let path = self.path_for(instance);
		let bytes = match fs::read(&path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::not_found(instance)),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
		};

		TokenFile::parse(instance, &bytes).map_err(|message| StoreError::Serialization {
			message: format!("Failed to parse {}: {message}", path.display()),
		})
	}

	fn delete_now(&self, instance: &InstanceName) -> Result<(), StoreError> {
		let _guard = self.lock.lock();
		let path = self.path_for(instance);

		match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::not_found(instance)),
			Err(e) => Err(StoreError::Backend {
				message: format!("Failed to remove {}: {e}", path.display()),
			}),
		}
	}
}
impl TokenStore for FileStore {
	fn backend(&self) -> &'static str {
		"file"
	}

	fn probe(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { Self::ensure_dir(&self.dir) })
	}

	fn save<'a>(&'a self, token: &'a Token) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.save_now(token) })
	}

	fn load<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, Token> {
		Box::pin(async move { self.load_now(instance) })
	}

	fn delete<'a>(&'a self, instance: &'a InstanceName) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.delete_now(instance) })
	}
}
