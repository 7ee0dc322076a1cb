//! Access/refresh token wrapper that stays out of logs.

// self
use crate::{_prelude::*, auth::credentials};

/// Token string whose `Debug` and `Display` never print the value.
///
/// The pipeline reads it through [`bearer`](Self::bearer) when building the `Authorization`
/// header and through [`is_well_formed`](Self::is_well_formed) in the auth gate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token value. Never log it.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the token passes the length and nullish-literal check.
	pub fn is_well_formed(&self) -> bool {
		credentials::is_well_formed(&self.0)
	}

	/// Returns `true` when `raw` is this exact token.
	pub fn matches(&self, raw: &str) -> bool {
		self.0 == raw
	}

	/// `Authorization` header value for this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret(<redacted, {} chars>)", self.0.len())
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
