//! Storage contracts and built-in key-value stores for persisted credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Key under which the access token is persisted.
pub const ACCESS_TOKEN_KEY: &str = "auth_token";
/// Key under which the refresh token is persisted.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key-value persistence contract used by the token manager.
///
/// Embedders supply in-memory, file-based, or OS-keychain-backed implementations. The
/// manager only ever touches [`ACCESS_TOKEN_KEY`] and [`REFRESH_TOKEN_KEY`].
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Persists or replaces the value stored under `key`.
	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes the value stored under `key`; missing keys are not an error.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_client_error_with_source() {
		let store_error = StoreError::Backend { message: "keychain locked".into() };
		let client_error: Error = store_error.clone().into();

		assert!(matches!(client_error, Error::Storage(_)));
		assert!(client_error.to_string().contains("keychain locked"));

		let source = StdError::source(&client_error)
			.expect("Client error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
