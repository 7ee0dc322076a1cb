//! In-memory credential pair and token shape validation.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Minimum length an access token must have to be attached to a request.
pub const MIN_TOKEN_LENGTH: usize = 10;

/// Access/refresh token pair owned by the token manager.
///
/// An empty slot is represented as `None`; empty strings never make it into the pair.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// Bearer token attached to protected requests.
	pub access_token: Option<TokenSecret>,
	/// Token exchanged at the refresh endpoint; never sent anywhere else.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the pair was last replaced.
	pub updated_at: Option<OffsetDateTime>,
}
impl Credentials {
	/// Builds a pair from raw strings, dropping empty values.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self {
			access_token: non_empty(access.into()),
			refresh_token: non_empty(refresh.into()),
			updated_at: Some(OffsetDateTime::now_utc()),
		}
	}

	/// Returns the access token if present.
	pub fn access(&self) -> Option<&str> {
		self.access_token.as_ref().map(TokenSecret::expose)
	}

	/// Returns the refresh token if present.
	pub fn refresh(&self) -> Option<&str> {
		self.refresh_token.as_ref().map(TokenSecret::expose)
	}

	/// Returns `true` when neither token is present.
	pub fn is_empty(&self) -> bool {
		self.access_token.is_none() && self.refresh_token.is_none()
	}

	/// Returns `true` when the access token passes the basic shape check.
	pub fn has_valid_access(&self) -> bool {
		self.access_token.as_ref().is_some_and(TokenSecret::is_well_formed)
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("updated_at", &self.updated_at)
			.finish()
	}
}

/// Basic token shape check: long enough and not a stringified JS nullish value.
pub fn is_well_formed(token: &str) -> bool {
	token.len() >= MIN_TOKEN_LENGTH && !token.contains("undefined") && !token.contains("null")
}

pub(crate) fn non_empty(value: String) -> Option<TokenSecret> {
	if value.trim().is_empty() { None } else { Some(TokenSecret::new(value)) }
}
