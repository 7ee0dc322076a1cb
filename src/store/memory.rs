//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Thread-safe storage backend that keeps entries in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Synchronous read used by tests and diagnostics.
	pub fn peek(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	fn set_now(map: StoreMap, key: &str, value: String) -> Result<(), StoreError> {
		map.write().insert(key.to_owned(), value);

		Ok(())
	}

	fn delete_now(map: StoreMap, key: &str) -> Result<(), StoreError> {
		map.write().remove(key);

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::set_now(map, key, value) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::delete_now(map, key) })
	}
}
