//! Simple file-backed [`TokenStore`] for desktop shells and CLI sessions.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, TokenStore},
};

/// Persists entries to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, String>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, String>) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.insert(key.to_owned(), value);
			self.persist_locked(&guard)
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.remove(key).is_some() {
				self.persist_locked(&guard)?;
			}

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"admin_api_client_file_store_{label}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn save_and_reload_round_trip() {
		let path = temp_path("reload");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store
			.set(ACCESS_TOKEN_KEY, "access-token-value".into())
			.await
			.expect("Failed to save access token to file store.");
		store
			.set(REFRESH_TOKEN_KEY, "refresh-token-value".into())
			.await
			.expect("Failed to save refresh token to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert_eq!(
			reopened.get(ACCESS_TOKEN_KEY).await.expect("Failed to read reopened store."),
			Some("access-token-value".into())
		);

		reopened.delete(REFRESH_TOKEN_KEY).await.expect("Failed to delete refresh token.");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert_eq!(
			reopened.get(REFRESH_TOKEN_KEY).await.expect("Failed to read reopened store."),
			None
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn corrupt_snapshot_is_reported() {
		let path = temp_path("corrupt");

		fs::write(&path, b"not json").expect("Failed to write corrupt snapshot fixture.");

		let err = FileStore::open(&path).expect_err("Corrupt snapshots should fail to open.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
